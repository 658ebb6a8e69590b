//! Discovered hosts and the host set they live in.

mod record;
mod set;

pub use record::{HealthTransition, HostRecord};
pub use set::{HostEntry, HostSet, HostSetWriter, HostView, Reconciliation, Snapshot, Transition};

use std::fmt;
use std::hash::Hash;
use std::net::SocketAddr;

/// Identity of a resolved endpoint.
///
/// The core never looks inside an address; it only compares, hashes and
/// prints it. `validate` lets discovery input be rejected before it reaches
/// the host set.
pub trait Address: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Check that the address is usable as a host identity.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Address for SocketAddr {
    fn validate(&self) -> Result<(), String> {
        if self.ip().is_unspecified() {
            return Err("unspecified ip address".to_string());
        }
        if self.port() == 0 {
            return Err("port 0".to_string());
        }
        Ok(())
    }
}

impl Address for String {
    fn validate(&self) -> Result<(), String> {
        if self.trim().is_empty() {
            Err("empty address".to_string())
        } else {
            Ok(())
        }
    }
}

/// Lifecycle state of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    /// Discovered and eligible for selection.
    ActiveHealthy,
    /// Discovered but failing; only selected when failing open.
    ActiveUnhealthy,
    /// Gone from discovery, kept until its connections drain.
    ExpiredDraining,
    /// Terminal.
    Removed,
}

impl HostState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            HostState::ActiveHealthy => 0,
            HostState::ActiveUnhealthy => 1,
            HostState::ExpiredDraining => 2,
            HostState::Removed => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => HostState::ActiveHealthy,
            1 => HostState::ActiveUnhealthy,
            2 => HostState::ExpiredDraining,
            _ => HostState::Removed,
        }
    }

    /// Whether the host is still part of the discovered population.
    pub fn is_active(self) -> bool {
        matches!(self, HostState::ActiveHealthy | HostState::ActiveUnhealthy)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostState::ActiveHealthy => "active_healthy",
            HostState::ActiveUnhealthy => "active_unhealthy",
            HostState::ExpiredDraining => "expired_draining",
            HostState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of a host, handed to observers and error values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot<A> {
    pub address: A,
    pub state: HostState,
    pub connections: u32,
}

impl<A: fmt::Display> fmt::Display for HostSnapshot<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {} conns)", self.address, self.state, self.connections)
    }
}
