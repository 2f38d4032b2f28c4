use crate::application::ports::offline_store::OfflineStore;
use crate::domain::entities::offline::PendingCounts;
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::watch;

/// Publishes queue sizes to whoever renders the pending-changes indicator.
pub struct PendingCountsProjection {
    store: Arc<dyn OfflineStore>,
    sender: watch::Sender<PendingCounts>,
}

impl PendingCountsProjection {
    pub fn new(store: Arc<dyn OfflineStore>) -> Self {
        let (sender, _) = watch::channel(PendingCounts::default());
        Self { store, sender }
    }

    /// Recount from the store and publish the result if it changed.
    pub async fn refresh(&self) -> Result<PendingCounts, AppError> {
        let counts = self.store.pending_counts().await?;
        self.sender.send_if_modified(|current| {
            if *current == counts {
                false
            } else {
                *current = counts;
                true
            }
        });
        Ok(counts)
    }

    pub fn current(&self) -> PendingCounts {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PendingCounts> {
        self.sender.subscribe()
    }
}
