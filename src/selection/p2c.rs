//! Power-of-two-choices host selection.

use super::{select_tiered, SelectionStrategy};
use crate::host::{Address, HostEntry, HostRecord};
use rand::Rng;
use std::sync::Arc;

/// Power of two choices.
///
/// Samples two distinct eligible hosts at random and keeps the one with
/// fewer connections. Needs no shared state at all.
pub struct PowerOfTwoChoices {
    fail_open: bool,
}

impl PowerOfTwoChoices {
    pub fn new(fail_open: bool) -> Self {
        Self { fail_open }
    }
}

impl Default for PowerOfTwoChoices {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<A: Address> SelectionStrategy<A> for PowerOfTwoChoices {
    fn select(&self, hosts: &[HostEntry<A>]) -> Option<Arc<HostRecord<A>>> {
        select_tiered(hosts, self.fail_open, |hosts, state| {
            let eligible = move || hosts.iter().filter(move |h| h.state() == state);
            let count = eligible().count();

            match count {
                0 => None,
                1 => eligible().next().map(|h| Arc::clone(h.record())),
                _ => {
                    let mut rng = rand::thread_rng();
                    let first = rng.gen_range(0..count);
                    // Second pick skips the first index
                    let mut second = rng.gen_range(0..count - 1);
                    if second >= first {
                        second += 1;
                    }

                    let a = eligible().nth(first)?;
                    let b = eligible().nth(second)?;
                    let winner = if b.connection_count() < a.connection_count() { b } else { a };
                    Some(Arc::clone(winner.record()))
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "p2c"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostState::*;
    use crate::selection::test_support::hosts;

    #[test]
    fn test_p2c_prefers_fewer_connections() {
        let p2c = PowerOfTwoChoices::default();
        let servers = hosts(&[ActiveHealthy, ActiveHealthy]);
        for _ in 0..5 {
            servers[0].record().acquire_connection();
        }

        // With two hosts both are always sampled
        for _ in 0..20 {
            assert_eq!(p2c.select(&servers).unwrap().address(), servers[1].address());
        }
    }

    #[test]
    fn test_p2c_single_eligible() {
        let p2c = PowerOfTwoChoices::default();
        let servers = hosts(&[ActiveUnhealthy, ActiveHealthy, ExpiredDraining]);

        for _ in 0..10 {
            assert_eq!(p2c.select(&servers).unwrap().address(), servers[1].address());
        }
    }

    #[test]
    fn test_p2c_covers_all_hosts() {
        let p2c = PowerOfTwoChoices::default();
        let servers = hosts(&[ActiveHealthy, ActiveHealthy, ActiveHealthy, ActiveHealthy]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(*p2c.select(&servers).unwrap().address());
        }
        assert_eq!(seen.len(), servers.len());
    }

    #[test]
    fn test_p2c_fail_open() {
        let servers = hosts(&[ActiveUnhealthy, ActiveUnhealthy]);

        assert!(PowerOfTwoChoices::new(false).select(&servers).is_none());
        assert!(PowerOfTwoChoices::new(true).select(&servers).is_some());
    }
}
