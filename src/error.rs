//! Error types surfaced by the load balancer core.

use crate::host::HostSnapshot;
use std::fmt;
use thiserror::Error;

/// No host is in an active state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{description}: no hosts available")]
pub struct NoAvailableHostError {
    pub description: String,
}

/// Hosts are active but none is eligible for selection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{description}: no active host among {} hosts", .hosts.len())]
pub struct NoActiveHostError<A: fmt::Debug> {
    pub description: String,
    /// Host set at the time of the failure.
    pub hosts: Vec<HostSnapshot<A>>,
}

/// Failure returned by `select`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectError<A: fmt::Debug> {
    #[error(transparent)]
    NoAvailableHost(#[from] NoAvailableHostError),

    #[error(transparent)]
    NoActiveHost(#[from] NoActiveHostError<A>),
}

impl<A: fmt::Debug> SelectError<A> {
    /// Whether the failure is structural (nothing discovered) rather than
    /// transient (everything unhealthy).
    pub fn is_no_available_host(&self) -> bool {
        matches!(self, SelectError::NoAvailableHost(_))
    }
}

/// Rejected discovery input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostState;

    #[test]
    fn test_error_messages() {
        let err: SelectError<String> = NoAvailableHostError {
            description: "svc".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "svc: no hosts available");
        assert!(err.is_no_available_host());

        let err: SelectError<String> = NoActiveHostError {
            description: "svc".to_string(),
            hosts: vec![HostSnapshot {
                address: "a".to_string(),
                state: HostState::ActiveUnhealthy,
                connections: 0,
            }],
        }
        .into();
        assert_eq!(err.to_string(), "svc: no active host among 1 hosts");
        assert!(!err.is_no_available_host());
    }
}
