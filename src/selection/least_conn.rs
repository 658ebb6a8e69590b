//! Least-connections host selection.

use super::{select_tiered, SelectionStrategy};
use crate::host::{Address, HostEntry, HostRecord};
use std::sync::Arc;

/// Least-connections selection.
///
/// Sends requests to the eligible host with the fewest attributed
/// connections. Ties go to the earliest host in the snapshot.
pub struct LeastConnections {
    fail_open: bool,
}

impl LeastConnections {
    pub fn new(fail_open: bool) -> Self {
        Self { fail_open }
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<A: Address> SelectionStrategy<A> for LeastConnections {
    fn select(&self, hosts: &[HostEntry<A>]) -> Option<Arc<HostRecord<A>>> {
        select_tiered(hosts, self.fail_open, |hosts, state| {
            let mut min_conns = u32::MAX;
            let mut selected = None;

            for host in hosts.iter().filter(|h| h.state() == state) {
                let conns = host.connection_count();
                if selected.is_none() || conns < min_conns {
                    min_conns = conns;
                    selected = Some(host);
                }
            }

            selected.map(|h| Arc::clone(h.record()))
        })
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostState::*;
    use crate::selection::test_support::hosts;

    #[test]
    fn test_least_conn_selects_lowest() {
        let lc = LeastConnections::default();
        let servers = hosts(&[ActiveHealthy, ActiveHealthy, ActiveHealthy]);

        servers[0].record().acquire_connection();
        servers[0].record().acquire_connection();
        servers[1].record().acquire_connection();

        let selected = lc.select(&servers).unwrap();
        assert_eq!(selected.address(), servers[2].address());
    }

    #[test]
    fn test_least_conn_equal_connections() {
        let lc = LeastConnections::default();
        let servers = hosts(&[ActiveHealthy, ActiveHealthy, ActiveHealthy]);

        let selected = lc.select(&servers).unwrap();
        assert_eq!(selected.address(), servers[0].address());
    }

    #[test]
    fn test_least_conn_ignores_idle_draining_host() {
        let lc = LeastConnections::default();
        let servers = hosts(&[ExpiredDraining, ActiveHealthy]);
        servers[1].record().acquire_connection();

        let selected = lc.select(&servers).unwrap();
        assert_eq!(selected.address(), servers[1].address());
    }

    #[test]
    fn test_least_conn_fail_open() {
        let servers = hosts(&[ActiveUnhealthy, ActiveUnhealthy]);
        servers[0].record().acquire_connection();

        assert!(LeastConnections::new(false).select(&servers).is_none());
        let selected = LeastConnections::new(true).select(&servers).unwrap();
        assert_eq!(selected.address(), servers[1].address());
    }
}
