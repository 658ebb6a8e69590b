//! hostlb - client-side load balancing core
//!
//! This crate tracks a dynamic set of hosts and picks one per request:
//! - Host set reconciliation from service discovery batches
//! - Draining of removed hosts until their last connection closes
//! - Consecutive failure tracking with probing of unhealthy hosts
//! - Round robin, least connections and power-of-two-choices selection
//! - Observer callbacks for every transition, with Prometheus metrics

pub mod balancer;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod health;
pub mod host;
pub mod metrics;
pub mod observer;
pub mod selection;
pub mod util;

pub use balancer::{LoadBalancerBuilder, LoadBalancerCore, Outcome};
pub use config::Config;
pub use discovery::{DiscoveryEvent, DiscoveryKind};
pub use error::SelectError;
pub use host::{Address, HostRecord, HostState};
