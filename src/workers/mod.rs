/// Long-running background components
pub mod network_monitor;

pub use network_monitor::{InterfaceKind, NetworkMonitor, PathUpdate};
