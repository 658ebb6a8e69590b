//! Host selection strategies.

mod least_conn;
mod p2c;
mod round_robin;

pub use least_conn::LeastConnections;
pub use p2c::PowerOfTwoChoices;
pub use round_robin::RoundRobin;

use crate::config::Algorithm;
use crate::host::{Address, HostEntry, HostRecord, HostState};
use std::sync::Arc;

/// Trait for host selection algorithms.
///
/// Implementations are called concurrently from request threads against an
/// immutable snapshot, so any internal state must be lock-free. Eligibility
/// is judged on the state recorded in the snapshot, not the live record.
pub trait SelectionStrategy<A>: Send + Sync {
    /// Pick one host for a request.
    ///
    /// Only `ActiveHealthy` hosts are eligible, plus `ActiveUnhealthy` ones
    /// when the strategy fails open. Returns `None` when nothing is eligible.
    fn select(&self, hosts: &[HostEntry<A>]) -> Option<Arc<HostRecord<A>>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the strategy for a configured algorithm.
pub fn strategy_for<A: Address>(
    algorithm: &Algorithm,
    fail_open: bool,
) -> Arc<dyn SelectionStrategy<A>> {
    match algorithm {
        Algorithm::RoundRobin => Arc::new(RoundRobin::new(fail_open)),
        Algorithm::LeastConnections => Arc::new(LeastConnections::new(fail_open)),
        Algorithm::PowerOfTwoChoices => Arc::new(PowerOfTwoChoices::new(fail_open)),
    }
}

/// Try healthy hosts first, then unhealthy ones if failing open.
fn select_tiered<A, F>(
    hosts: &[HostEntry<A>],
    fail_open: bool,
    mut pick: F,
) -> Option<Arc<HostRecord<A>>>
where
    A: Address,
    F: FnMut(&[HostEntry<A>], HostState) -> Option<Arc<HostRecord<A>>>,
{
    if hosts.is_empty() {
        return None;
    }
    pick(hosts, HostState::ActiveHealthy).or_else(|| {
        if fail_open {
            pick(hosts, HostState::ActiveUnhealthy)
        } else {
            None
        }
    })
}
