use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use swell::config::Settings;
use swell::kernel::{DeviceRecord, ExecuteOptions, ExecutionEngine, SessionState};
use swell::services::kasa::{self, DiscoveryOptions, KasaService, ScanOptions};
use swell::services::{DeviceRegistry, DeviceService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  swell run <settings.json> <devices.json>   read model output from stdin
  swell discover [timeout-secs]
  swell scan <subnet-prefix, e.g. 192.168.1>
  swell state <ip> [child-id]
  swell info <ip>
  swell children <ip>
  swell on|off|toggle <ip> [child-id]
  swell emeter <ip> [child-id]
  swell led <ip> <on|off>
  swell reboot <ip> [delay-secs]
  swell cloud <ip>
  swell wifi <ip>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("run") => {
            let (Some(settings), Some(devices)) = (args.get(1), args.get(2)) else {
                bail!("{USAGE}");
            };
            run(settings, devices).await
        }
        Some("discover") => {
            let secs = match args.get(1) {
                Some(s) => s.parse().context("timeout must be whole seconds")?,
                None => 3,
            };
            let options = DiscoveryOptions::default().with_timeout(Duration::from_secs(secs));
            for ip in kasa::discover(&options).await {
                println!("{ip}");
            }
            Ok(())
        }
        Some("scan") => {
            let Some(prefix) = args.get(1) else { bail!("{USAGE}") };
            let found = kasa::scan_subnet(prefix, &ScanOptions::default()).await;
            println!("{}", serde_json::to_string_pretty(&found)?);
            Ok(())
        }
        Some("state") => {
            let device = device_arg(&args)?;
            let state = device.get_state().await.context("state query failed")?;
            print_json(&state)
        }
        Some("info") => print_json(&device_arg(&args)?.get_info().await?),
        Some("children") => print_json(&device_arg(&args)?.get_children().await?),
        Some("on") => print_json(&device_arg(&args)?.turn_on().await?),
        Some("off") => print_json(&device_arg(&args)?.turn_off().await?),
        Some("toggle") => print_json(&device_arg(&args)?.toggle().await?),
        Some("emeter") => print_json(&device_arg(&args)?.emeter_realtime().await?),
        Some("led") => {
            let on = match args.get(2).map(String::as_str) {
                Some("on") => true,
                Some("off") => false,
                _ => bail!("{USAGE}"),
            };
            let Some(ip) = args.get(1) else { bail!("{USAGE}") };
            print_json(&kasa::KasaDevice::new(ip.as_str()).set_led(on).await?)
        }
        Some("reboot") => {
            let Some(ip) = args.get(1) else { bail!("{USAGE}") };
            let delay = match args.get(2) {
                Some(s) => s.parse().context("delay must be whole seconds")?,
                None => 1,
            };
            print_json(&kasa::KasaDevice::new(ip.as_str()).reboot(delay).await?)
        }
        Some("cloud") => {
            let Some(ip) = args.get(1) else { bail!("{USAGE}") };
            print_json(&kasa::KasaDevice::new(ip.as_str()).get_cloud_info().await?)
        }
        Some("wifi") => {
            let Some(ip) = args.get(1) else { bail!("{USAGE}") };
            print_json(&kasa::KasaDevice::new(ip.as_str()).scan_wifi().await?)
        }
        _ => bail!("{USAGE}"),
    }
}

/// `<ip> [child-id]` from the command line.
fn device_arg(args: &[String]) -> Result<kasa::KasaDevice> {
    let Some(ip) = args.get(1) else { bail!("{USAGE}") };
    Ok(kasa::KasaDevice::new(ip.as_str()).with_child(args.get(2).cloned()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(settings_path: &str, devices_path: &str) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let devices_json = std::fs::read_to_string(devices_path)
        .with_context(|| format!("reading {devices_path}"))?;
    let devices: Vec<DeviceRecord> =
        serde_json::from_str(&devices_json).context("parsing device list")?;

    let registry: Arc<dyn DeviceService> =
        Arc::new(DeviceRegistry::new().with_backend("kasa", Arc::new(KasaService::new())));

    let engine = ExecutionEngine::new().with_context_injector(Arc::new(|tag: &str| {
        tracing::info!("Context injection: {}", tag);
    }));

    let mut notifications = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("[EVENT] {json}"),
                Err(e) => tracing::warn!("Unserializable notification: {}", e),
            }
        }
    });

    let options = ExecuteOptions::new(settings.controls().clone(), SessionState::default());
    tracing::info!("Device control ready: {} devices. Ctrl+C for emergency stop.", devices.len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let processed = engine
                    .process_response(&line, &devices, registry.clone(), &options)
                    .await;
                println!("{}", processed.display_text);
                for result in &processed.results {
                    println!("[RESULT] {}", serde_json::to_string(result)?);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let results = engine.emergency_stop(&devices, registry.clone()).await;
                let failed = results.iter().filter(|r| !r.success).count();
                tracing::warn!("Emergency stop complete ({} failures)", failed);
                return Ok(());
            }
        }
    }

    // Let pending auto-offs run before exiting.
    while !engine.timers().is_empty() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(())
}
