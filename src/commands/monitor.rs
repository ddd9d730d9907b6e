//! `monitor`: poll the status endpoint and print each snapshot

use std::time::Duration;

use colored::Colorize;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::health::{HealthMonitor, HealthSnapshot, HealthState};

/// One status line for a snapshot.
pub fn format_snapshot(snapshot: &HealthSnapshot) -> String {
    let state = match snapshot.state {
        HealthState::Healthy => snapshot.state.to_string().green(),
        HealthState::Degraded => snapshot.state.to_string().yellow(),
        HealthState::Unhealthy => snapshot.state.to_string().red(),
        HealthState::Unknown => snapshot.state.to_string().dimmed(),
    };
    let latency = snapshot
        .latency_ms
        .map(|ms| format!("{:.1} ms", ms))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{} latency={} ema={:.1} ms jitter={:.1} ms",
        state, latency, snapshot.smoothed_latency_ms, snapshot.jitter_ms
    );
    if let Some(payload) = &snapshot.payload {
        if let Some(name) = &payload.server_name {
            line.push_str(&format!(" server={}", name));
        }
        if let Some(clients) = payload.connected_clients {
            line.push_str(&format!(" clients={}", clients));
        }
    }
    if let Some(error) = &snapshot.error {
        line.push_str(&format!(" ({})", error));
    }
    line
}

/// Poll until `count` checks have been printed or Ctrl-C is pressed.
///
/// Returns whether the last observed state was healthy.
pub async fn run_monitor(config: &Config, interval_ms: Option<u64>, count: Option<u64>) -> Result<bool> {
    let mut settings = config.health.monitor_config();
    if let Some(ms) = interval_ms {
        settings.period = Duration::from_millis(ms);
    }
    if count == Some(0) {
        return Err(ProbeError::Config("--count must be at least 1".into()).into());
    }

    let monitor = HealthMonitor::new(settings)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = monitor.subscribe(move |snapshot| {
        let _ = tx.send(snapshot.clone());
    });

    println!("Monitoring {} every {:?}", config.health.endpoint.bold(), monitor.period());
    monitor.start();

    let mut seen = 0u64;
    let mut last = HealthState::Unknown;
    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                println!("{} {}", chrono::Local::now().format("%H:%M:%S"), format_snapshot(&snapshot));
                last = snapshot.state;
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    monitor.stop();
    subscription.unsubscribe();
    if let Some(caps) = monitor.capabilities() {
        tracing::debug!(capabilities = %caps, "cached server capabilities");
    }
    Ok(last == HealthState::Healthy)
}
