use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::directive::{resolve_device, Action, CommandResult, DeviceKind, DeviceRecord, Directive};
use super::event::{DeviceControl, Notification, SafetyBlock, PULSE_COMPLETE};
use super::parser;
use super::reinforcer::{reinforce, Reinforcement};
use super::session::SessionState;
use super::timers::TimerRegistry;
use crate::config::ControlSettings;
use crate::services::DeviceService;

/// Capacity at or above which pump activation is refused.
pub const CAPACITY_LIMIT: f64 = 100.0;

const NOTIFICATION_BUFFER: usize = 64;

/// Called with a literal tag when the engine changes device state on its
/// own, so the conversation transcript stays in sync.
pub type ContextInjector = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub settings: ControlSettings,
    pub session: SessionState,
    /// Origin label carried on safety notifications (e.g. "llm").
    pub source: String,
}

impl ExecuteOptions {
    pub fn new(settings: ControlSettings, session: SessionState) -> Self {
        Self {
            settings,
            session,
            source: "llm".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedResponse {
    pub batch_id: Uuid,
    /// Text for the end user, tags removed.
    pub display_text: String,
    pub results: Vec<CommandResult>,
    pub reinforcement: Reinforcement,
}

/// Turns parsed directives into capability calls and owns the timers that
/// switch devices back off.
pub struct ExecutionEngine {
    timers: TimerRegistry,
    notifier: broadcast::Sender<Notification>,
    injector: Option<ContextInjector>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            timers: TimerRegistry::new(),
            notifier,
            injector: None,
        }
    }

    pub fn with_context_injector(mut self, injector: ContextInjector) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Cancel every pending auto-off and pulse-off.
    pub fn clear_all_timers(&self) -> usize {
        let cleared = self.timers.clear_all();
        if cleared > 0 {
            info!("Cleared {} device timers", cleared);
        }
        cleared
    }

    /// Full pipeline for one block of model output: reinforce, parse,
    /// execute, strip. Never fails; the display text is always produced.
    pub async fn process_response(
        &self,
        text: &str,
        devices: &[DeviceRecord],
        capability: Arc<dyn DeviceService>,
        options: &ExecuteOptions,
    ) -> ProcessedResponse {
        let batch_id = Uuid::new_v4();
        let span = info_span!("device_batch", %batch_id);

        async {
            let reinforcement = reinforce(text, devices, &options.session, &options.settings);
            let directives = parser::parse(&reinforcement.text);

            let results = if directives.is_empty() {
                Vec::new()
            } else if !options.settings.llm_device_control {
                info!("Ignoring {} device tags: device control disabled", directives.len());
                Vec::new()
            } else {
                self.execute(directives, devices, capability, options).await
            };

            ProcessedResponse {
                batch_id,
                display_text: parser::strip(&reinforcement.text),
                results,
                reinforcement,
            }
        }
        .instrument(span)
        .await
    }

    /// Execute directives in order. The last directive per device wins;
    /// one result is returned per surviving directive.
    pub async fn execute(
        &self,
        directives: Vec<Directive>,
        devices: &[DeviceRecord],
        capability: Arc<dyn DeviceService>,
        options: &ExecuteOptions,
    ) -> Vec<CommandResult> {
        let mut results = Vec::new();

        for directive in dedupe(directives) {
            let Some(device) = resolve_device(devices, directive.device).cloned() else {
                warn!("No {} device configured for {}", directive.device.type_name(), directive.raw_match);
                let error = format!("No {} device configured", directive.device.type_name());
                results.push(CommandResult::failed(directive, None, error));
                continue;
            };

            if let Some(result) = self.check_safety(&directive, &device, options) {
                results.push(result);
                continue;
            }

            let result = match directive.action {
                Action::On => self.run_on(directive, device, capability.clone(), options).await,
                Action::Pulse => self.run_pulse(directive, device, capability.clone(), options).await,
                Action::Off => self.run_off(directive, device, capability.as_ref()).await,
            };
            results.push(result);
        }

        results
    }

    /// Cancel all timers and switch every device off. One result per device.
    pub async fn emergency_stop(
        &self,
        devices: &[DeviceRecord],
        capability: Arc<dyn DeviceService>,
    ) -> Vec<CommandResult> {
        warn!("Emergency stop: {} devices", devices.len());
        self.clear_all_timers();

        let mut results = Vec::with_capacity(devices.len());
        for device in devices {
            let directive = Directive {
                device: device.device_type,
                action: Action::Off,
                duration: None,
                raw_match: String::new(),
            };
            let result = match capability.turn_off(&device.address, device).await {
                Ok(value) => CommandResult::succeeded(directive, device.clone(), value),
                Err(e) => {
                    warn!("Emergency stop failed for {}: {}", device.display_name(), e);
                    CommandResult::failed(directive, Some(device.clone()), e.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    fn check_safety(
        &self,
        directive: &Directive,
        device: &DeviceRecord,
        options: &ExecuteOptions,
    ) -> Option<CommandResult> {
        if directive.device != DeviceKind::Pump || directive.action == Action::Off {
            return None;
        }
        if options.settings.allow_over_inflation {
            return None;
        }
        let capacity = options.session.capacity();
        if capacity < CAPACITY_LIMIT {
            return None;
        }

        let reason = format!("Capacity at {}%, pump activation blocked", capacity);
        warn!("Safety interlock: {} ({})", reason, directive.raw_match);
        self.notify(Notification::PumpSafetyBlock(SafetyBlock {
            reason: reason.clone(),
            capacity,
            device: device.display_name().to_string(),
            source: options.source.clone(),
        }));
        Some(CommandResult::blocked(directive.clone(), device.clone(), reason))
    }

    async fn run_on(
        &self,
        directive: Directive,
        device: DeviceRecord,
        capability: Arc<dyn DeviceService>,
        options: &ExecuteOptions,
    ) -> CommandResult {
        let value = match capability.turn_on(&device.address, &device).await {
            Ok(value) => value,
            Err(e) => return self.capability_failed(directive, device, e),
        };

        let secs = options.settings.llm_device_control_max_seconds;
        info!("{} on ({}), auto-off in {}s", directive.device, device.display_name(), secs);

        let kind = directive.device;
        let key = device.timer_key(kind);
        let notifier = self.notifier.clone();
        let injector = self.injector.clone();
        let target = device.clone();

        self.timers.arm(&key, Duration::from_secs(secs), async move {
            info!("Auto-off firing for {} ({})", kind, target.display_name());
            if let Err(e) = capability.turn_off(&target.address, &target).await {
                warn!("Auto-off failed for {}: {}", target.display_name(), e);
            }
            if let Some(inject) = injector {
                inject(&format!("[{} off]", kind));
            }
            let _ = notifier.send(Notification::AiDeviceControl(DeviceControl {
                device: kind,
                action: Action::Off,
                device_name: target.display_name().to_string(),
                auto_off: Some(true),
                duration: None,
                reason: None,
            }));
        });

        CommandResult::succeeded(directive, device, value)
    }

    async fn run_pulse(
        &self,
        directive: Directive,
        device: DeviceRecord,
        capability: Arc<dyn DeviceService>,
        options: &ExecuteOptions,
    ) -> CommandResult {
        let value = match capability.turn_on(&device.address, &device).await {
            Ok(value) => value,
            Err(e) => return self.capability_failed(directive, device, e),
        };

        let secs = directive
            .duration
            .filter(|d| *d > 0)
            .unwrap_or(options.settings.llm_device_control_pulse_duration);
        info!("{} pulse ({}) for {}s", directive.device, device.display_name(), secs);

        let kind = directive.device;
        let key = device.timer_key(kind);
        let notifier = self.notifier.clone();
        let target = device.clone();

        self.timers.arm(&key, Duration::from_secs(secs), async move {
            if let Err(e) = capability.turn_off(&target.address, &target).await {
                warn!("Pulse-off failed for {}: {}", target.display_name(), e);
            }
            let _ = notifier.send(Notification::AiDeviceControl(DeviceControl {
                device: kind,
                action: Action::Off,
                device_name: target.display_name().to_string(),
                auto_off: None,
                duration: None,
                reason: Some(PULSE_COMPLETE.to_string()),
            }));
        });

        self.notify(Notification::AiDeviceControl(DeviceControl {
            device: kind,
            action: Action::Pulse,
            device_name: device.display_name().to_string(),
            auto_off: None,
            duration: Some(secs),
            reason: None,
        }));

        CommandResult::succeeded(directive, device, value)
    }

    async fn run_off(
        &self,
        directive: Directive,
        device: DeviceRecord,
        capability: &dyn DeviceService,
    ) -> CommandResult {
        // Manual off always beats a pending auto-off or pulse.
        if self.timers.clear(&device.timer_key(directive.device)) {
            info!("Cancelled pending timer for {}", device.display_name());
        }

        match capability.turn_off(&device.address, &device).await {
            Ok(value) => {
                info!("{} off ({})", directive.device, device.display_name());
                CommandResult::succeeded(directive, device, value)
            }
            Err(e) => self.capability_failed(directive, device, e),
        }
    }

    fn capability_failed(
        &self,
        directive: Directive,
        device: DeviceRecord,
        error: crate::error::DeviceError,
    ) -> CommandResult {
        warn!("{} {} failed on {}: {}", directive.device, directive.action, device.display_name(), error);
        CommandResult::failed(directive, Some(device), error.to_string())
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.notifier.send(notification);
    }
}

/// Keep the last directive per device. Each survivor sits where its device
/// first appeared, so ordering between devices is stable.
pub fn dedupe(directives: Vec<Directive>) -> Vec<Directive> {
    let mut survivors: Vec<Directive> = Vec::new();
    for directive in directives {
        match survivors.iter_mut().find(|d| d.device == directive.device) {
            Some(slot) => *slot = directive,
            None => survivors.push(directive),
        }
    }
    survivors
}
