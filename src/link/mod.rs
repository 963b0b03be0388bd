//! UDP link layer: endpoints, shared statistics, link supervision

pub mod stats;
pub mod supervisor;
pub mod transport;

pub use stats::LinkStats;
pub use supervisor::{LinkState, LinkSupervisor, Watchdog};
pub use transport::{UdpEndpoint, UdpLink};
