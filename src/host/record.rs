//! Per-host record and its health state machine.
//!
//! Counters are atomics so the request path and transport threads can read
//! them without locking. State transitions are only applied while holding the
//! host set writer, which keeps the transitions of one host totally ordered.
//!
//! Lifecycle state and connection count share one `AtomicU64` (state in the
//! high half, count in the low half). A connection can then never be
//! attributed to a record that is concurrently being removed.

use super::{Address, HostSnapshot, HostState};
use crate::observer::HostObserver;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Health change produced by a reported outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    /// ActiveHealthy -> ActiveUnhealthy.
    MarkedUnhealthy,
    /// ActiveUnhealthy -> ActiveHealthy.
    Revived,
}

/// One discovered endpoint.
pub struct HostRecord<A> {
    /// Creation sequence within the host set, used for snapshot ordering.
    id: u64,
    address: A,
    /// Packed lifecycle state and connection count.
    lifecycle: AtomicU64,
    /// Health at the moment the host left the active states.
    last_healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    /// Bumped on every state transition.
    generation: AtomicU64,
    observer: Arc<dyn HostObserver>,
}

impl<A> HostRecord<A> {
    /// Current lifecycle state.
    pub fn state(&self) -> HostState {
        state_of(self.lifecycle.load(Ordering::Acquire))
    }

    /// Connections currently attributed to this host.
    pub fn connection_count(&self) -> u32 {
        count_of(self.lifecycle.load(Ordering::Acquire))
    }
}

impl<A: Address> HostRecord<A> {
    pub(crate) fn new(id: u64, address: A, observer: Arc<dyn HostObserver>) -> Self {
        Self {
            id,
            address,
            lifecycle: AtomicU64::new(pack(HostState::ActiveHealthy, 0)),
            last_healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            observer,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// The endpoint identity.
    pub fn address(&self) -> &A {
        &self.address
    }

    /// Whether the host is active and healthy.
    pub fn is_healthy(&self) -> bool {
        self.state() == HostState::ActiveHealthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes.load(Ordering::Relaxed)
    }

    /// Number of state transitions applied so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Copy the observable fields.
    pub fn snapshot(&self) -> HostSnapshot<A> {
        HostSnapshot {
            address: self.address.clone(),
            state: self.state(),
            connections: self.connection_count(),
        }
    }

    pub(crate) fn observer(&self) -> &Arc<dyn HostObserver> {
        &self.observer
    }

    /// Apply `next` to the lifecycle word while `allow` holds. Resets the
    /// streaks and bumps the generation on success.
    fn transition_if<F>(&self, next: HostState, allow: F) -> bool
    where
        F: Fn(HostState, u32) -> bool,
    {
        let applied = self
            .lifecycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let count = count_of(word);
                allow(state_of(word), count).then(|| pack(next, count))
            })
            .is_ok();
        if applied {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        applied
    }

    fn transition(&self, next: HostState) {
        self.transition_if(next, |_, _| true);
    }

    /// Attribute a new connection to this host. Refused once removed.
    pub(crate) fn acquire_connection(&self) -> bool {
        self.lifecycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                if state_of(word) == HostState::Removed || count_of(word) == u32::MAX {
                    None
                } else {
                    Some(word + 1)
                }
            })
            .is_ok()
    }

    /// Release a connection. Returns the remaining count, or `None` if there
    /// was nothing to release.
    pub(crate) fn release_connection(&self) -> Option<u32> {
        self.lifecycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (count_of(word) > 0).then(|| word - 1)
            })
            .ok()
            .map(|previous| count_of(previous) - 1)
    }

    /// Record a successful request or probe.
    pub(crate) fn record_success(&self, healthy_threshold: u32) -> Option<HealthTransition> {
        match self.state() {
            HostState::ActiveHealthy => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                None
            }
            HostState::ActiveUnhealthy => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= healthy_threshold {
                    self.last_healthy.store(true, Ordering::Relaxed);
                    self.transition(HostState::ActiveHealthy);
                    Some(HealthTransition::Revived)
                } else {
                    None
                }
            }
            HostState::ExpiredDraining | HostState::Removed => None,
        }
    }

    /// Record a failed request or probe.
    pub(crate) fn record_failure(&self, unhealthy_threshold: u32) -> Option<HealthTransition> {
        match self.state() {
            HostState::ActiveHealthy => {
                self.consecutive_successes.store(0, Ordering::Relaxed);
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= unhealthy_threshold {
                    self.last_healthy.store(false, Ordering::Relaxed);
                    self.transition(HostState::ActiveUnhealthy);
                    Some(HealthTransition::MarkedUnhealthy)
                } else {
                    None
                }
            }
            HostState::ActiveUnhealthy => {
                self.consecutive_successes.store(0, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
            HostState::ExpiredDraining | HostState::Removed => None,
        }
    }

    /// Move an active host to ExpiredDraining.
    pub(crate) fn expire(&self) {
        self.last_healthy
            .store(self.state() == HostState::ActiveHealthy, Ordering::Relaxed);
        self.transition(HostState::ExpiredDraining);
    }

    /// Bring an expired host back, restoring its last known health.
    pub(crate) fn revive_expired(&self) -> HostState {
        let next = if self.last_healthy.load(Ordering::Relaxed) {
            HostState::ActiveHealthy
        } else {
            HostState::ActiveUnhealthy
        };
        self.transition(next);
        next
    }

    /// Remove the host if it has no connections. Fails, leaving the record
    /// untouched, when a connection is attributed to it.
    pub(crate) fn remove_if_idle(&self) -> bool {
        self.transition_if(HostState::Removed, |state, count| {
            state != HostState::Removed && count == 0
        })
    }
}

const COUNT_MASK: u64 = 0xFFFF_FFFF;

fn pack(state: HostState, count: u32) -> u64 {
    (u64::from(state.to_u8()) << 32) | u64::from(count)
}

fn state_of(word: u64) -> HostState {
    HostState::from_u8((word >> 32) as u8)
}

fn count_of(word: u64) -> u32 {
    (word & COUNT_MASK) as u32
}

impl<A: fmt::Debug> fmt::Debug for HostRecord<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRecord")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("connections", &self.connection_count())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}
