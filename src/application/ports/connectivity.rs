use tokio::sync::watch;

/// Debounced view of whether the remote store is reachable.
pub trait ConnectivityStatus: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that changes on every debounced transition.
    fn subscribe(&self) -> watch::Receiver<bool>;
}
