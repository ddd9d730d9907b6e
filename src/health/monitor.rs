//! The polling loop
//!
//! The first check fires as soon as [`HealthMonitor::start`] is called and
//! later ones every period. Each check's request timeout is
//! `max(period - 500ms, 2000ms)`.
//!
//! Failed checks still feed their elapsed time into the statistics. The
//! background task is the only thing the monitor keeps running; `stop` and
//! `Drop` cancel it.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ExpiringCache, HealthPayload, HealthSnapshot, HealthState, LatencyStats};
use crate::error::{ProbeError, Result};
use crate::events::{Listeners, Subscription};

const TIMEOUT_MARGIN: Duration = Duration::from_millis(500);
const MIN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Request timeout for a given polling period.
///
/// ```
/// use mcp_probe::health::request_timeout;
/// use std::time::Duration;
///
/// assert_eq!(request_timeout(Duration::from_secs(5)), Duration::from_millis(4500));
/// assert_eq!(request_timeout(Duration::from_secs(1)), Duration::from_secs(2));
/// ```
pub fn request_timeout(period: Duration) -> Duration {
    period.saturating_sub(TIMEOUT_MARGIN).max(MIN_TIMEOUT)
}

/// What one poll of the status endpoint produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Success status with a readable payload
    Payload(HealthPayload),
    /// Reachable but not healthy
    Degraded(String),
    /// No answer
    Unreachable(String),
}

/// Source of status readings.
#[async_trait::async_trait]
pub trait StatusProbe: Send + Sync {
    /// Poll once, giving up after `timeout`.
    async fn probe(&self, timeout: Duration) -> ProbeOutcome;
}

/// GETs a status URL with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStatusProbe {
    /// Probe for `endpoint`, which must be an http or https URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProbeError::Health(format!("invalid status endpoint `{}`: {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ProbeError::Health(format!(
                "status endpoint must be http or https, got `{}`",
                endpoint.scheme()
            ))
            .into());
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Health(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn probe(&self, timeout: Duration) -> ProbeOutcome {
        let response = match self
            .client
            .get(self.endpoint.clone())
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::Unreachable(format!(
                    "status check timed out after {}ms",
                    timeout.as_millis()
                ))
            }
            Err(e) => return ProbeOutcome::Unreachable(format!("status check failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::Degraded(format!("status endpoint returned {}", status));
        }
        match response.json::<HealthPayload>().await {
            Ok(payload) => ProbeOutcome::Payload(payload),
            Err(e) if e.is_timeout() => ProbeOutcome::Unreachable(format!(
                "status check timed out after {}ms",
                timeout.as_millis()
            )),
            Err(e) => ProbeOutcome::Degraded(format!("unreadable status payload: {}", e)),
        }
    }
}

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Status URL
    pub endpoint: String,
    /// Time between checks
    pub period: Duration,
    /// How long discovered capabilities stay cached
    pub capability_ttl: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:47101/mcp/health".to_string(),
            period: Duration::from_millis(5000),
            capability_ttl: Duration::from_secs(300),
        }
    }
}

struct Shared {
    probe: Box<dyn StatusProbe>,
    period: Mutex<Duration>,
    stats: Mutex<LatencyStats>,
    snapshot: Mutex<HealthSnapshot>,
    capabilities: ExpiringCache<Value>,
    listeners: Listeners<HealthSnapshot>,
}

impl Shared {
    fn period(&self) -> Duration {
        *self.period.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn check(&self) -> HealthSnapshot {
        let timeout = request_timeout(self.period());
        let started = Instant::now();
        let outcome = self.probe.probe(timeout).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (smoothed, jitter) = {
            let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
            stats.record(latency_ms);
            (stats.ema(), stats.jitter())
        };

        let (state, payload, error) = match outcome {
            ProbeOutcome::Payload(payload) => {
                if let Some(caps) = &payload.capabilities {
                    self.capabilities.set(caps.clone());
                }
                (HealthState::Healthy, Some(payload), None)
            }
            ProbeOutcome::Degraded(e) => (HealthState::Degraded, None, Some(e)),
            ProbeOutcome::Unreachable(e) => (HealthState::Unhealthy, None, Some(e)),
        };

        let snapshot = HealthSnapshot {
            state,
            payload,
            checked_at: Some(Utc::now()),
            latency_ms: Some(latency_ms),
            smoothed_latency_ms: smoothed,
            jitter_ms: jitter,
            error,
        };

        let previous = {
            let mut current = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *current, snapshot.clone()).state
        };
        if previous != snapshot.state {
            match snapshot.state {
                HealthState::Healthy => tracing::info!(from = %previous, to = %snapshot.state, "server health changed"),
                _ => tracing::warn!(
                    from = %previous,
                    to = %snapshot.state,
                    error = snapshot.error.as_deref().unwrap_or_default(),
                    "server health changed"
                ),
            }
        }
        tracing::debug!(state = %snapshot.state, latency_ms, "health check complete");
        metrics::histogram!("mcp_probe_health_latency_ms", latency_ms, "state" => snapshot.state.to_string());

        self.listeners.emit(&snapshot);
        snapshot
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Polls a status endpoint on a timer.
///
/// # Examples
///
/// ```no_run
/// use mcp_probe::health::{HealthMonitor, HealthMonitorConfig};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let monitor = HealthMonitor::new(HealthMonitorConfig::default())?;
/// let _sub = monitor.subscribe(|snapshot| println!("{}", snapshot.state));
/// monitor.start();
/// # Ok(())
/// # }
/// ```
pub struct HealthMonitor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("period", &self.period())
            .field("running", &self.is_running())
            .field("state", &self.snapshot().state)
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Monitor polling `config.endpoint` over HTTP.
    ///
    /// # Errors
    ///
    /// Fails on an invalid endpoint or a zero period.
    pub fn new(config: HealthMonitorConfig) -> Result<Self> {
        let probe = HttpStatusProbe::new(&config.endpoint)?;
        Self::with_probe(Box::new(probe), config.period, config.capability_ttl)
    }

    /// Monitor over any status source.
    pub fn with_probe(
        probe: Box<dyn StatusProbe>,
        period: Duration,
        capability_ttl: Duration,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(ProbeError::Health("polling period must be greater than zero".into()).into());
        }
        Ok(Self {
            shared: Arc::new(Shared {
                probe,
                period: Mutex::new(period),
                stats: Mutex::new(LatencyStats::new()),
                snapshot: Mutex::new(HealthSnapshot::default()),
                capabilities: ExpiringCache::new(capability_ttl),
                listeners: Listeners::new(),
            }),
            running: Mutex::new(None),
        })
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn spawn(&self, immediate: bool) -> Running {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            if immediate {
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = shared.check() => {}
                }
            }
            loop {
                let period = shared.period();
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = tokio::time::sleep(period) => {}
                }
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = shared.check() => {}
                }
            }
        });
        Running { token, handle }
    }

    /// Begin polling, with the first check right away. No-op when running.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running();
        if running.is_some() {
            return;
        }
        tracing::info!(period_ms = self.period().as_millis() as u64, "health monitor started");
        *running = Some(self.spawn(true));
    }

    /// Cancel polling. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(task) = self.running().take() {
            task.cancel();
            tracing::info!("health monitor stopped");
        }
    }

    /// Whether the polling task is active.
    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Current period.
    pub fn period(&self) -> Duration {
        self.shared.period()
    }

    /// Change the period. A running timer restarts and the next check fires
    /// one new period from now; the latest snapshot is kept.
    pub fn set_period(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(ProbeError::Health("polling period must be greater than zero".into()).into());
        }
        *self.shared.period.lock().unwrap_or_else(|p| p.into_inner()) = period;
        let mut running = self.running();
        if let Some(task) = running.take() {
            task.cancel();
            *running = Some(self.spawn(false));
            tracing::debug!(period_ms = period.as_millis() as u64, "health monitor timer restarted");
        }
        Ok(())
    }

    /// Run one check now, outside the timer.
    pub async fn check_now(&self) -> HealthSnapshot {
        self.shared.check().await
    }

    /// Latest snapshot; `Unknown` before the first check.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.shared
            .snapshot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Capabilities from the last healthy payload, while fresh.
    pub fn capabilities(&self) -> Option<Value> {
        self.shared.capabilities.get()
    }

    /// Receive every new snapshot.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&HealthSnapshot) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(handler)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a script, then repeats the last answer.
    struct ScriptedProbe {
        calls: Arc<AtomicUsize>,
        timeouts: Arc<Mutex<Vec<Duration>>>,
        answers: Mutex<VecDeque<ProbeOutcome>>,
    }

    impl ScriptedProbe {
        fn new(answers: Vec<ProbeOutcome>) -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<Duration>>>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let timeouts = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: calls.clone(),
                    timeouts: timeouts.clone(),
                    answers: Mutex::new(answers.into()),
                },
                calls,
                timeouts,
            )
        }
    }

    #[async_trait::async_trait]
    impl StatusProbe for ScriptedProbe {
        async fn probe(&self, timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers.front().cloned().unwrap()
            }
        }
    }

    fn healthy() -> ProbeOutcome {
        ProbeOutcome::Payload(HealthPayload {
            status: "ok".into(),
            protocol_version: Some("2024-11-05".into()),
            server_name: Some("demo".into()),
            server_version: None,
            connected_clients: Some(1),
            capabilities: Some(json!({"tools": true})),
        })
    }

    fn monitor(answers: Vec<ProbeOutcome>, period_ms: u64) -> (HealthMonitor, Arc<AtomicUsize>, Arc<Mutex<Vec<Duration>>>) {
        let (probe, calls, timeouts) = ScriptedProbe::new(answers);
        let m = HealthMonitor::with_probe(
            Box::new(probe),
            Duration::from_millis(period_ms),
            Duration::from_secs(300),
        )
        .unwrap();
        (m, calls, timeouts)
    }

    #[test]
    fn test_request_timeout_floor() {
        assert_eq!(request_timeout(Duration::from_millis(10_000)), Duration::from_millis(9_500));
        assert_eq!(request_timeout(Duration::from_millis(2_500)), Duration::from_millis(2_000));
        assert_eq!(request_timeout(Duration::from_millis(100)), Duration::from_millis(2_000));
    }

    #[test]
    fn test_zero_period_rejected() {
        let (probe, _, _) = ScriptedProbe::new(vec![healthy()]);
        assert!(HealthMonitor::with_probe(Box::new(probe), Duration::ZERO, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unknown_before_first_check() {
        let (m, calls, _) = monitor(vec![healthy()], 1000);
        assert_eq!(m.snapshot().state, HealthState::Unknown);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classification_and_capabilities() {
        let (m, _, timeouts) = monitor(
            vec![
                healthy(),
                ProbeOutcome::Degraded("status endpoint returned 503".into()),
                ProbeOutcome::Unreachable("refused".into()),
            ],
            5000,
        );
        let s = m.check_now().await;
        assert_eq!(s.state, HealthState::Healthy);
        assert_eq!(s.payload.unwrap().server_name.as_deref(), Some("demo"));
        assert_eq!(m.capabilities(), Some(json!({"tools": true})));

        let s = m.check_now().await;
        assert_eq!(s.state, HealthState::Degraded);
        assert!(s.error.unwrap().contains("503"));

        let s = m.check_now().await;
        assert_eq!(s.state, HealthState::Unhealthy);
        // Unhealthy checks still count toward the statistics.
        assert!(s.jitter_ms >= 0.0);
        assert_eq!(m.shared.stats.lock().unwrap().count(), 3);
        // Capabilities survive unhealthy checks until the TTL runs out.
        assert!(m.capabilities().is_some());

        assert_eq!(timeouts.lock().unwrap()[0], Duration::from_millis(4500));
    }

    #[tokio::test]
    async fn test_every_check_is_broadcast() {
        let (m, _, _) = monitor(vec![healthy(), ProbeOutcome::Unreachable("down".into())], 1000);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = m.subscribe(move |s| sink.lock().unwrap().push(s.state));

        m.check_now().await;
        m.check_now().await;
        sub.unsubscribe();
        m.check_now().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![HealthState::Healthy, HealthState::Unhealthy]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_schedule_and_period_change() {
        let (m, calls, _) = monitor(vec![healthy()], 1000);

        m.start();
        m.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "first check fires immediately");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        m.set_period(Duration::from_millis(5000)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "no extra check on period change");
        assert_eq!(m.snapshot().state, HealthState::Healthy);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        m.stop();
        m.stop();
        assert!(!m.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let (m, calls, _) = monitor(vec![healthy()], 1000);
        m.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(m);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_http_probe_rejects_bad_endpoints() {
        assert!(HttpStatusProbe::new("not a url").is_err());
        assert!(HttpStatusProbe::new("ftp://host/health").is_err());
        assert!(HttpStatusProbe::new("http://127.0.0.1:47101/mcp/health").is_ok());
    }
}
