use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swell::config::ControlSettings;
use swell::error::DeviceError;
use swell::kernel::engine::dedupe;
use swell::kernel::event::{Notification, PULSE_COMPLETE};
use swell::kernel::parser::parse;
use swell::kernel::{Action, DeviceKind, DeviceRecord, ExecuteOptions, ExecutionEngine, SessionState};
use swell::services::{DeviceRegistry, DeviceService};

/// Records every capability call as ("on"|"off", address).
#[derive(Default)]
struct RecordingService {
    calls: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingService {
    fn failing(addresses: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, action: &str, address: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(a, addr)| a == action && addr == address)
            .count()
    }

    fn record(&self, action: &str, address: &str) -> Result<Value, DeviceError> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), address.to_string()));
        if self.failing.contains(address) {
            return Err(DeviceError::Backend(format!("{address} unreachable")));
        }
        Ok(json!({ "ok": action }))
    }
}

#[async_trait]
impl DeviceService for RecordingService {
    async fn turn_on(&self, address: &str, _device: &DeviceRecord) -> Result<Value, DeviceError> {
        self.record("on", address)
    }

    async fn turn_off(&self, address: &str, _device: &DeviceRecord) -> Result<Value, DeviceError> {
        self.record("off", address)
    }
}

const PUMP: &str = "10.0.0.5";
const VIBE: &str = "10.0.0.6";

fn device(kind: DeviceKind, address: &str, primary: bool) -> DeviceRecord {
    DeviceRecord {
        device_type: kind,
        is_primary_pump: primary,
        brand: "mock".into(),
        address: address.into(),
        child_id: None,
        label: None,
    }
}

fn devices() -> Vec<DeviceRecord> {
    vec![device(DeviceKind::Pump, PUMP, false), device(DeviceKind::Vibe, VIBE, false)]
}

fn options() -> ExecuteOptions {
    let settings = ControlSettings {
        llm_device_control: true,
        ..ControlSettings::default()
    };
    ExecuteOptions::new(settings, SessionState::default())
}

fn options_with_capacity(capacity: f64, allow_over_inflation: bool) -> ExecuteOptions {
    let mut opts = options();
    opts.session.capacity = Some(capacity);
    opts.settings.allow_over_inflation = allow_over_inflation;
    opts
}

#[test]
fn test_dedupe_keeps_last_per_device_in_first_seen_order() {
    let survivors = dedupe(parse("[pump on] [vibe on] [pump:pulse:3] [vibe off] [pump off]"));
    let seen: Vec<(DeviceKind, Action)> = survivors.iter().map(|d| (d.device, d.action)).collect();
    assert_eq!(seen, vec![(DeviceKind::Pump, Action::Off), (DeviceKind::Vibe, Action::Off)]);
}

#[tokio::test(start_paused = true)]
async fn test_on_then_off_only_runs_off() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let results = engine
        .execute(parse("[pump on] ... [pump off]"), &devices(), service.clone(), &options())
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].directive.action, Action::Off);
    assert!(results[0].success);
    assert_eq!(service.calls(), vec![("off".to_string(), PUMP.to_string())]);
    assert!(engine.timers().is_empty(), "no auto-off may remain armed");
}

#[tokio::test(start_paused = true)]
async fn test_pulse_turns_off_once_after_duration() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());
    let mut events = engine.subscribe();

    let results = engine
        .execute(parse("[pump:pulse:5]"), &devices(), service.clone(), &options())
        .await;
    assert!(results[0].success);
    assert_eq!(service.count("on", PUMP), 1);
    assert_eq!(service.count("off", PUMP), 0);

    match events.recv().await.unwrap() {
        Notification::AiDeviceControl(ev) => {
            assert_eq!(ev.action, Action::Pulse);
            assert_eq!(ev.duration, Some(5));
        }
        other => panic!("unexpected notification {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(service.count("off", PUMP), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(service.count("off", PUMP), 1);
    assert!(engine.timers().is_empty());

    match events.recv().await.unwrap() {
        Notification::AiDeviceControl(ev) => {
            assert_eq!(ev.action, Action::Off);
            assert_eq!(ev.reason.as_deref(), Some(PULSE_COMPLETE));
        }
        other => panic!("unexpected notification {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(service.count("off", PUMP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pulse_without_duration_uses_default() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());
    let mut opts = options();
    opts.settings.llm_device_control_pulse_duration = 2;

    engine
        .execute(parse("[vibe:pulse:0]"), &devices(), service.clone(), &opts)
        .await;

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(service.count("off", VIBE), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(service.count("off", VIBE), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_off_fires_and_injects_context() {
    let injected = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = injected.clone();
    let engine = ExecutionEngine::new().with_context_injector(Arc::new(move |tag: &str| {
        sink.lock().unwrap().push(tag.to_string());
    }));
    let service = Arc::new(RecordingService::default());
    let mut events = engine.subscribe();
    let mut opts = options();
    opts.settings.llm_device_control_max_seconds = 10;

    engine
        .execute(parse("[pump on]"), &devices(), service.clone(), &opts)
        .await;
    assert!(engine.timers().is_armed(&format!("pump-{PUMP}")));

    tokio::time::sleep(Duration::from_secs(11)).await;

    assert_eq!(service.count("off", PUMP), 1);
    assert!(engine.timers().is_empty());
    assert_eq!(*injected.lock().unwrap(), vec!["[pump off]".to_string()]);
    match events.recv().await.unwrap() {
        Notification::AiDeviceControl(ev) => {
            assert_eq!(ev.device, DeviceKind::Pump);
            assert_eq!(ev.action, Action::Off);
            assert_eq!(ev.auto_off, Some(true));
        }
        other => panic!("unexpected notification {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rearming_keeps_one_timer_per_device() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());
    let devs = devices();

    engine.execute(parse("[pump on]"), &devs, service.clone(), &options()).await;
    assert_eq!(engine.timers().len(), 1);

    tokio::time::sleep(Duration::from_secs(20)).await;
    engine.execute(parse("[pump:pulse:5]"), &devs, service.clone(), &options()).await;
    assert_eq!(engine.timers().len(), 1);

    engine.execute(parse("[pump on]"), &devs, service.clone(), &options()).await;
    assert_eq!(engine.timers().len(), 1);

    engine.execute(parse("[vibe on]"), &devs, service.clone(), &options()).await;
    assert_eq!(engine.timers().len(), 2);

    // The first auto-off (due at 30s) and the pulse (due at 25s) were superseded.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(service.count("off", PUMP), 0);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(service.count("off", PUMP), 1);
    assert_eq!(service.count("off", VIBE), 1);
    assert!(engine.timers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_off_cancels_pending_auto_off() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    engine.execute(parse("[vibe on]"), &devices(), service.clone(), &options()).await;
    engine.execute(parse("[vibe off]"), &devices(), service.clone(), &options()).await;
    assert!(engine.timers().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count("off", VIBE), 1);
}

#[tokio::test(start_paused = true)]
async fn test_safety_blocks_pump_at_full_capacity() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());
    let mut events = engine.subscribe();

    let results = engine
        .execute(parse("[pump on]"), &devices(), service.clone(), &options_with_capacity(100.0, false))
        .await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0].blocked);
    assert!(service.calls().is_empty());
    assert!(engine.timers().is_empty());

    match events.recv().await.unwrap() {
        Notification::PumpSafetyBlock(block) => {
            assert_eq!(block.capacity, 100.0);
            assert_eq!(block.source, "llm");
        }
        other => panic!("unexpected notification {other:?}"),
    }

    let pulse = engine
        .execute(parse("[pump:pulse:2]"), &devices(), service.clone(), &options_with_capacity(140.0, false))
        .await;
    assert!(pulse[0].blocked);
    assert!(service.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_safety_override_allows_activation() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let results = engine
        .execute(parse("[pump on]"), &devices(), service.clone(), &options_with_capacity(100.0, true))
        .await;

    assert!(results[0].success);
    assert!(!results[0].blocked);
    assert_eq!(service.count("on", PUMP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_safety_ignores_off_and_other_devices() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let results = engine
        .execute(
            parse("[pump off] [vibe on]"),
            &devices(),
            service.clone(),
            &options_with_capacity(120.0, false),
        )
        .await;

    assert!(results.iter().all(|r| r.success && !r.blocked));
    assert_eq!(service.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_device_does_not_abort_batch() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let results = engine
        .execute(parse("[tens on] [vibe on]"), &devices(), service.clone(), &options())
        .await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert_eq!(results[0].error.as_deref(), Some("No TENS device configured"));
    assert!(results[0].device.is_none());
    assert!(results[1].success);
    assert_eq!(service.count("on", VIBE), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capability_failure_is_isolated() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::failing(&[PUMP]));

    let results = engine
        .execute(parse("[pump on] [vibe on]"), &devices(), service.clone(), &options())
        .await;

    assert!(!results[0].success);
    assert!(!results[0].blocked);
    assert!(results[0].error.as_deref().unwrap().contains("unreachable"));
    assert!(results[1].success);
    assert_eq!(engine.timers().len(), 1, "failed activation arms no timer");
}

#[tokio::test(start_paused = true)]
async fn test_primary_pump_preferred() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());
    let devs = vec![
        device(DeviceKind::Pump, "10.0.0.1", false),
        device(DeviceKind::Pump, "10.0.0.2", true),
    ];

    let results = engine.execute(parse("[pump on]"), &devs, service.clone(), &options()).await;
    assert_eq!(results[0].device.as_ref().unwrap().address, "10.0.0.2");

    let no_primary = vec![
        device(DeviceKind::Pump, "10.0.0.3", false),
        device(DeviceKind::Pump, "10.0.0.4", false),
    ];
    let results = engine.execute(parse("[pump off]"), &no_primary, service.clone(), &options()).await;
    assert_eq!(results[0].device.as_ref().unwrap().address, "10.0.0.3");
}

#[tokio::test(start_paused = true)]
async fn test_clear_all_timers_is_safe_when_empty() {
    let engine = ExecutionEngine::new();
    assert_eq!(engine.clear_all_timers(), 0);

    let service = Arc::new(RecordingService::default());
    engine.execute(parse("[pump on] [vibe:pulse:9]"), &devices(), service.clone(), &options()).await;
    assert_eq!(engine.clear_all_timers(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count("off", PUMP), 0);
    assert_eq!(service.count("off", VIBE), 0);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_clears_timers_and_turns_everything_off() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::failing(&[VIBE]));

    engine.execute(parse("[pump on]"), &devices(), service.clone(), &options()).await;
    let results = engine.emergency_stop(&devices(), service.clone()).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(engine.timers().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count("off", PUMP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_process_response_strips_even_when_blocked() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let processed = engine
        .process_response(
            "Almost there. [pump on] Hold still.",
            &devices(),
            service.clone(),
            &options_with_capacity(100.0, false),
        )
        .await;

    assert_eq!(processed.display_text, "Almost there. Hold still.");
    assert_eq!(processed.results.len(), 1);
    assert!(processed.results[0].blocked);
}

#[tokio::test(start_paused = true)]
async fn test_process_response_reinforces_narration() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let processed = engine
        .process_response(
            "The pump begins to hum as air rushes into the tube.",
            &devices(),
            service.clone(),
            &options(),
        )
        .await;

    assert!(processed.reinforcement.reinforced);
    assert_eq!(processed.display_text, "The pump begins to hum as air rushes into the tube.");
    assert_eq!(service.count("on", PUMP), 1);
}

#[tokio::test(start_paused = true)]
async fn test_process_response_ignores_tags_when_disabled() {
    let engine = ExecutionEngine::new();
    let service = Arc::new(RecordingService::default());

    let processed = engine
        .process_response("Okay [pump on]", &devices(), service.clone(), &ExecuteOptions::new(ControlSettings::default(), SessionState::default()))
        .await;

    assert_eq!(processed.display_text, "Okay");
    assert!(processed.results.is_empty());
    assert!(service.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_registry_routes_by_brand() {
    let engine = ExecutionEngine::new();
    let mock = Arc::new(RecordingService::default());
    let registry = Arc::new(DeviceRegistry::new().with_backend("MOCK", mock.clone()));

    let mut devs = devices();
    devs[1].brand = "unknown".into();

    let results = engine.execute(parse("[pump on] [vibe on]"), &devs, registry, &options()).await;

    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().contains("unknown"));
    assert_eq!(mock.count("on", PUMP), 1);
}
