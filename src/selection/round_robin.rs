//! Round-robin host selection.

use super::{select_tiered, SelectionStrategy};
use crate::host::{Address, HostEntry, HostRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin selection.
///
/// Walks the snapshot from a shared cursor and takes the first eligible host.
/// The cursor wraps on overflow; concurrent callers get eventual coverage,
/// not strict fairness.
pub struct RoundRobin {
    cursor: AtomicUsize,
    fail_open: bool,
}

impl RoundRobin {
    pub fn new(fail_open: bool) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            fail_open,
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<A: Address> SelectionStrategy<A> for RoundRobin {
    fn select(&self, hosts: &[HostEntry<A>]) -> Option<Arc<HostRecord<A>>> {
        if hosts.is_empty() {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        select_tiered(hosts, self.fail_open, |hosts, state| {
            let len = hosts.len();
            (0..len)
                .map(|offset| &hosts[start.wrapping_add(offset) % len])
                .find(|h| h.state() == state)
                .map(|h| Arc::clone(h.record()))
        })
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostState::{self, *};
    use crate::selection::test_support::hosts;

    #[test]
    fn test_round_robin_cycles() {
        let rr = RoundRobin::new(false);
        let servers = hosts(&[ActiveHealthy, ActiveHealthy, ActiveHealthy]);

        let picks: Vec<_> = (0..4)
            .map(|_| *rr.select(&servers).unwrap().address())
            .collect();

        assert_eq!(picks[0], *servers[0].address());
        assert_eq!(picks[1], *servers[1].address());
        assert_eq!(picks[2], *servers[2].address());
        assert_eq!(picks[3], *servers[0].address()); // Cycles back
    }

    #[test]
    fn test_round_robin_empty() {
        let rr = RoundRobin::default();
        let empty: Vec<HostEntry<std::net::SocketAddr>> = Vec::new();
        assert!(rr.select(&empty).is_none());
    }

    #[test]
    fn test_round_robin_skips_ineligible() {
        let rr = RoundRobin::new(false);
        let servers = hosts(&[ExpiredDraining, ActiveUnhealthy, ActiveHealthy]);

        for _ in 0..6 {
            assert_eq!(rr.select(&servers).unwrap().address(), servers[2].address());
        }
    }

    #[test]
    fn test_round_robin_fail_open() {
        let servers = hosts(&[ActiveUnhealthy, ExpiredDraining, ActiveUnhealthy]);

        assert!(RoundRobin::new(false).select(&servers).is_none());

        let rr = RoundRobin::new(true);
        for _ in 0..6 {
            let picked = rr.select(&servers).unwrap();
            assert_eq!(picked.state(), HostState::ActiveUnhealthy);
        }
    }

    #[test]
    fn test_round_robin_uses_snapshot_state() {
        let rr = RoundRobin::new(false);
        let servers = hosts(&[ActiveHealthy, ActiveHealthy]);

        // Record removed after the snapshot was taken
        servers[0].record().remove_if_idle();
        let picks: Vec<_> = (0..2).map(|_| *rr.select(&servers).unwrap().address()).collect();
        assert!(picks.contains(servers[0].address()));
    }

    #[test]
    fn test_round_robin_cursor_wraps() {
        let rr = RoundRobin::new(false);
        rr.cursor.store(usize::MAX, Ordering::Relaxed);
        let servers = hosts(&[ActiveHealthy, ActiveHealthy, ActiveHealthy]);

        assert!(rr.select(&servers).is_some());
        assert!(rr.select(&servers).is_some());
        assert_eq!(rr.cursor.load(Ordering::Relaxed), 1);
    }
}
