pub mod connectivity_monitor;
pub mod reachability;

pub use connectivity_monitor::ConnectivityMonitor;
pub use reachability::{HttpReachabilityProbe, ReachabilityProbe, spawn_probe_loop};
