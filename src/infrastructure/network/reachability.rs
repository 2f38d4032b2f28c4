use super::ConnectivityMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Treats any HTTP response from the remote base URL as reachable.
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(err) => {
                tracing::trace!(
                    target: "offline::connectivity",
                    error = %err,
                    "reachability probe failed"
                );
                false
            }
        }
    }
}

/// Poll `probe` every `interval` and feed the results into `monitor`.
pub fn spawn_probe_loop(
    probe: Arc<dyn ReachabilityProbe>,
    monitor: Arc<ConnectivityMonitor>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reachable = probe.probe().await;
            monitor.report(reachable);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::connectivity::ConnectivityStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ToggleProbe(AtomicBool);

    #[async_trait]
    impl ReachabilityProbe for ToggleProbe {
        async fn probe(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_results_drive_monitor() {
        let probe = Arc::new(ToggleProbe(AtomicBool::new(true)));
        let monitor = Arc::new(ConnectivityMonitor::new(false, Duration::from_millis(100)));
        let handle = spawn_probe_loop(probe.clone(), Arc::clone(&monitor), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(monitor.is_online());

        probe.0.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!monitor.is_online());

        handle.abort();
    }

    #[tokio::test]
    async fn test_http_probe_reports_unreachable_host() {
        let probe =
            HttpReachabilityProbe::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(!probe.probe().await);
    }
}
