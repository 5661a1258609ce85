//! Periodic dataset-quality refresh.
//!
//! Each cycle moves `Idle -> Fetching -> Scoring -> Idle`. A failed cycle is
//! logged and counted and the next tick runs as usual. Stopping suppresses
//! future ticks but lets an in-flight cycle finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use capi_core::{CapiResult, HttpTransport, Transport};

use crate::analysis::{analyze, QualityAnalysis};
use crate::client::DatasetQualityClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Fetching,
    Scoring,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MonitorState>,
    latest: Mutex<Option<QualityAnalysis>>,
    stop: Mutex<Option<Arc<watch::Sender<bool>>>>,
    cycles: AtomicU64,
    failures: AtomicU64,
}

/// Runs analysis cycles on a fixed period and keeps the latest result.
pub struct QualityMonitor<T = HttpTransport> {
    client: DatasetQualityClient<T>,
    period: Duration,
    shared: Arc<Shared>,
}

impl<T> Clone for QualityMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            period: self.period,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Control over one running refresh task.
#[derive(Debug)]
pub struct RefreshHandle {
    stop: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Suppress future ticks.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait until the task has exited.
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

impl<T: Transport> QualityMonitor<T> {
    /// Period taken from `refresh_interval_ms`.
    pub fn new(client: DatasetQualityClient<T>) -> Self {
        let period = Duration::from_millis(client.config().refresh_interval_ms.max(1));
        Self::with_period(client, period)
    }

    pub fn with_period(client: DatasetQualityClient<T>, period: Duration) -> Self {
        Self {
            client,
            period,
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::Idle),
                latest: Mutex::new(None),
                stop: Mutex::new(None),
                cycles: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn client(&self) -> &DatasetQualityClient<T> {
        &self.client
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> MonitorState {
        *self.shared.state.lock()
    }

    pub fn latest(&self) -> Option<QualityAnalysis> {
        self.shared.latest.lock().clone()
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Failed cycles.
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: MonitorState) {
        *self.shared.state.lock() = state;
    }

    /// One fetch-and-score pass.
    pub async fn run_cycle(&self) -> CapiResult<QualityAnalysis> {
        self.set_state(MonitorState::Fetching);
        let response = match self.client.fetch_response(None).await {
            Ok(response) => response,
            Err(err) => {
                self.set_state(MonitorState::Idle);
                self.shared.failures.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        self.set_state(MonitorState::Scoring);
        let analysis = analyze(&response);
        *self.shared.latest.lock() = Some(analysis.clone());
        self.shared.cycles.fetch_add(1, Ordering::Relaxed);
        self.set_state(MonitorState::Idle);
        Ok(analysis)
    }

    /// Spawn the refresh loop, stopping any loop this monitor started before.
    /// The first cycle runs one period after the call.
    pub fn start(&self) -> RefreshHandle {
        let (tx, mut rx) = watch::channel(false);
        let tx = Arc::new(tx);
        if let Some(previous) = self.shared.stop.lock().replace(Arc::clone(&tx)) {
            previous.send_replace(true);
        }

        let monitor = self.clone();
        let period = self.period;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match monitor.run_cycle().await {
                            Ok(analysis) => info!(
                                overall_score = analysis.overall_score,
                                count = analysis.events.len(),
                                "quality refresh completed"
                            ),
                            Err(err) => warn!(error = %err, "quality refresh failed"),
                        }
                    }
                }
            }
            info!("quality refresh stopped");
        });

        info!(period_ms = period.as_millis() as u64, "quality refresh started");
        RefreshHandle { stop: tx, task }
    }

    /// Start only when `enable_auto_refresh` is set.
    pub fn maybe_start(&self) -> Option<RefreshHandle> {
        self.client
            .config()
            .enable_auto_refresh
            .then(|| self.start())
    }

    /// Stop the loop started most recently, if any.
    pub fn stop(&self) {
        if let Some(tx) = self.shared.stop.lock().take() {
            tx.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capi_core::config::QualityConfig;
    use capi_core::{HttpRequest, MemoryTransport, TransportError};
    use serde_json::json;

    /// Answers with `sample()`, holding the first request for `first_delay`,
    /// and records when each request arrived.
    struct SlowFirstTransport {
        first_delay: Duration,
        starts: Mutex<Vec<Instant>>,
    }

    impl Transport for SlowFirstTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<serde_json::Value, TransportError> {
            let first = {
                let mut starts = self.starts.lock();
                starts.push(Instant::now());
                starts.len() == 1
            };
            if first {
                tokio::time::sleep(self.first_delay).await;
            }
            Ok(sample())
        }
    }

    fn sample() -> serde_json::Value {
        json!({
            "web": [{
                "event_name": "Purchase",
                "event_match_quality": {"percentage": 90},
                "acr": {"percentage": 90},
                "data_freshness": {"upload_frequency": "real_time"},
                "event_deduplication": {"percentage": 90},
                "event_coverage": {"percentage": 90},
                "event_potential_aly_acr_increase": {"percentage": 10}
            }]
        })
    }

    fn monitor(transport: MemoryTransport, period_ms: u64) -> (QualityMonitor<MemoryTransport>, Arc<MemoryTransport>) {
        let transport = Arc::new(transport);
        let config = QualityConfig {
            access_token: "token".into(),
            dataset_id: "ds".into(),
            ..Default::default()
        };
        let client = DatasetQualityClient::new(config, Arc::clone(&transport));
        (
            QualityMonitor::with_period(client, Duration::from_millis(period_ms)),
            transport,
        )
    }

    #[test]
    fn test_period_from_config() {
        let config = QualityConfig::default();
        let client = DatasetQualityClient::new(config, Arc::new(MemoryTransport::new()));
        let monitor = QualityMonitor::new(client);
        assert_eq!(monitor.period(), Duration::from_millis(300_000));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_run_cycle_success() {
        let (monitor, _) = monitor(MemoryTransport::with_fallback(Ok(sample())), 1000);
        let analysis = monitor.run_cycle().await.unwrap();
        // 27 + 22.5 + 18 + 13.5 + 1 = 82
        assert_eq!(analysis.overall_score, 82);
        assert_eq!(monitor.cycles(), 1);
        assert_eq!(monitor.failures(), 0);
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.latest().map(|a| a.overall_score), Some(82));
    }

    #[tokio::test]
    async fn test_run_cycle_failure() {
        let (monitor, _) = monitor(MemoryTransport::failing(500, "down"), 1000);
        assert!(monitor.run_cycle().await.is_err());
        assert_eq!(monitor.failures(), 1);
        assert_eq!(monitor.cycles(), 0);
        assert!(monitor.latest().is_none());
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn test_refresh_runs_until_stopped() {
        let (monitor, transport) = monitor(MemoryTransport::with_fallback(Ok(sample())), 10);
        let handle = monitor.start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(monitor.cycles() >= 2);
        assert!(handle.is_running());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), handle.stopped())
            .await
            .unwrap();

        let after_stop = transport.request_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.request_count(), after_stop);
    }

    #[tokio::test]
    async fn test_no_cycle_before_first_period() {
        let (monitor, transport) = monitor(MemoryTransport::with_fallback(Ok(sample())), 60_000);
        let handle = monitor.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.request_count(), 0);
        handle.stop();
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_refresh() {
        let (monitor, _) = monitor(MemoryTransport::failing(503, "busy"), 10);
        let handle = monitor.start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(monitor.failures() >= 2);
        assert!(handle.is_running());
        handle.stop();
    }

    #[tokio::test]
    async fn test_restart_stops_previous_loop() {
        let (monitor, _) = monitor(MemoryTransport::with_fallback(Ok(sample())), 10);
        let first = monitor.start();
        let second = monitor.start();

        tokio::time::timeout(Duration::from_secs(2), first.stopped())
            .await
            .unwrap();
        assert!(second.is_running());

        monitor.stop();
        tokio::time::timeout(Duration::from_secs(2), second.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overrun_does_not_burst_missed_ticks() {
        let transport = Arc::new(SlowFirstTransport {
            first_delay: Duration::from_millis(250),
            starts: Mutex::new(Vec::new()),
        });
        let config = QualityConfig {
            access_token: "token".into(),
            dataset_id: "ds".into(),
            ..Default::default()
        };
        let client = DatasetQualityClient::new(config, Arc::clone(&transport));
        let monitor = QualityMonitor::with_period(client, Duration::from_millis(50));
        let handle = monitor.start();

        tokio::time::sleep(Duration::from_millis(450)).await;
        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), handle.stopped())
            .await
            .unwrap();

        // the slow first cycle covers several periods; only one catch-up tick
        // may follow it immediately, later cycles keep the period apart
        let starts = transport.starts.lock().clone();
        assert!(starts.len() >= 4, "only {} cycles ran", starts.len());
        for pair in starts[1..].windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(25),
                "cycles ran back-to-back: {:?}",
                pair[1] - pair[0]
            );
        }
    }

    #[tokio::test]
    async fn test_maybe_start_respects_config() {
        let transport = Arc::new(MemoryTransport::new());
        let config = QualityConfig {
            enable_auto_refresh: false,
            ..Default::default()
        };
        let monitor = QualityMonitor::new(DatasetQualityClient::new(config, transport));
        assert!(monitor.maybe_start().is_none());
    }
}
