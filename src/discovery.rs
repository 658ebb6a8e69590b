//! Service discovery events and batch resolution.

use crate::error::DiscoveryError;
use crate::host::Address;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use tracing::warn;

/// Whether discovery considers an address reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryKind {
    Available,
    Unavailable,
}

/// One discovery notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent<A> {
    pub address: A,
    pub kind: DiscoveryKind,
}

impl<A> DiscoveryEvent<A> {
    pub fn available(address: A) -> Self {
        Self {
            address,
            kind: DiscoveryKind::Available,
        }
    }

    pub fn unavailable(address: A) -> Self {
        Self {
            address,
            kind: DiscoveryKind::Unavailable,
        }
    }
}

impl<A: fmt::Display> fmt::Display for DiscoveryEvent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiscoveryKind::Available => write!(f, "+{}", self.address),
            DiscoveryKind::Unavailable => write!(f, "-{}", self.address),
        }
    }
}

/// Check one event before it is allowed near the host set.
pub fn validate_event<A: Address>(event: &DiscoveryEvent<A>) -> Result<(), DiscoveryError> {
    event
        .address
        .validate()
        .map_err(|reason| DiscoveryError::InvalidAddress {
            address: event.address.to_string(),
            reason,
        })
}

/// Collapse a batch into one kind per address.
///
/// Addresses keep the order of their first appearance. If both kinds appear
/// for one address, `Unavailable` wins. Invalid events are logged and dropped.
pub fn resolve_batch<A: Address>(events: &[DiscoveryEvent<A>]) -> Vec<(A, DiscoveryKind)> {
    let mut resolved: Vec<(A, DiscoveryKind)> = Vec::with_capacity(events.len());
    let mut index: HashMap<A, usize> = HashMap::with_capacity(events.len());

    for event in events {
        if let Err(e) = validate_event(event) {
            warn!(error = %e, "dropping discovery event");
            continue;
        }

        match index.entry(event.address.clone()) {
            Entry::Occupied(slot) => {
                if event.kind == DiscoveryKind::Unavailable {
                    resolved[*slot.get()].1 = DiscoveryKind::Unavailable;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(resolved.len());
                resolved.push((event.address.clone(), event.kind));
            }
        }
    }

    resolved
}
