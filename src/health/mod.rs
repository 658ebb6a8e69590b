//! Health checking for unhealthy hosts.

mod checker;
mod probe;

pub use checker::HealthChecker;
pub use probe::{HealthError, HealthProbe, TcpProbe};
