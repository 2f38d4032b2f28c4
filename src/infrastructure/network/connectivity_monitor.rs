use crate::application::ports::connectivity::ConnectivityStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Debounces raw reachability reports into online/offline transitions.
///
/// A new value is published only after the raw signal has held it for the whole
/// debounce window, so a link that flaps inside the window publishes nothing.
pub struct ConnectivityMonitor {
    raw: watch::Sender<bool>,
    debounced: Arc<watch::Sender<bool>>,
    debounce_task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool, debounce: Duration) -> Self {
        let (raw, raw_rx) = watch::channel(initially_online);
        let (debounced, _) = watch::channel(initially_online);
        let debounced = Arc::new(debounced);

        let debounce_task = tokio::spawn(Self::debounce_loop(
            raw_rx,
            Arc::clone(&debounced),
            debounce,
        ));

        Self {
            raw,
            debounced,
            debounce_task,
        }
    }

    /// Feed a raw reachability observation.
    pub fn report(&self, reachable: bool) {
        self.raw.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
    }

    async fn debounce_loop(
        mut raw: watch::Receiver<bool>,
        debounced: Arc<watch::Sender<bool>>,
        debounce: Duration,
    ) {
        loop {
            if raw.changed().await.is_err() {
                break;
            }

            // Wait until the raw value has been quiet for a full window.
            loop {
                match tokio::time::timeout(debounce, raw.changed()).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => return,
                    Err(_) => break,
                }
            }

            let settled = *raw.borrow_and_update();
            let changed = debounced.send_if_modified(|current| {
                if *current == settled {
                    false
                } else {
                    *current = settled;
                    true
                }
            });
            if changed {
                tracing::info!(
                    target: "offline::connectivity",
                    online = settled,
                    "connectivity changed"
                );
            }
        }
    }
}

impl ConnectivityStatus for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.debounced.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.debounced.subscribe()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}
