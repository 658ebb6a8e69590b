//! Authoritative host collection with a copy-on-write read view.
//!
//! All writes go through a single mutex-guarded writer. Every write that
//! changes membership or a host's state publishes a fresh immutable
//! `HostView` through `ArcSwap`. The view carries each host's state as of
//! publication, so readers see either the previous or the next host set,
//! never a mix.

use super::{Address, HealthTransition, HostRecord, HostSnapshot, HostState};
use crate::discovery::{resolve_batch, DiscoveryEvent, DiscoveryKind};
use crate::observer::HostObserver;
use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::slice;
use std::sync::Arc;
use tracing::debug;

/// Published read view.
pub type Snapshot<A> = Arc<HostView<A>>;

/// A host as it stood when its view was published.
#[derive(Debug, Clone)]
pub struct HostEntry<A> {
    record: Arc<HostRecord<A>>,
    state: HostState,
}

impl<A: Address> HostEntry<A> {
    pub(crate) fn new(record: Arc<HostRecord<A>>) -> Self {
        let state = record.state();
        Self { record, state }
    }

    pub fn record(&self) -> &Arc<HostRecord<A>> {
        &self.record
    }

    pub fn address(&self) -> &A {
        self.record.address()
    }

    /// State at publication time.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Live connection count.
    pub fn connection_count(&self) -> u32 {
        self.record.connection_count()
    }

    pub fn snapshot(&self) -> HostSnapshot<A> {
        HostSnapshot {
            address: self.address().clone(),
            state: self.state,
            connections: self.connection_count(),
        }
    }
}

/// Immutable host list in creation order, indexed by address.
#[derive(Debug)]
pub struct HostView<A> {
    hosts: Vec<HostEntry<A>>,
    index: HashMap<A, usize>,
    active: usize,
}

impl<A: Address> HostView<A> {
    fn empty() -> Self {
        Self {
            hosts: Vec::new(),
            index: HashMap::new(),
            active: 0,
        }
    }

    fn build(map: &HostMap<A>) -> Self {
        let mut records: Vec<&Arc<HostRecord<A>>> = map.hosts.values().collect();
        records.sort_by_key(|h| h.id());

        let hosts: Vec<HostEntry<A>> = records
            .into_iter()
            .map(|h| HostEntry::new(Arc::clone(h)))
            .collect();
        let index = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.address().clone(), i))
            .collect();
        let active = hosts.iter().filter(|h| h.state.is_active()).count();

        Self {
            hosts,
            index,
            active,
        }
    }

    pub fn hosts(&self) -> &[HostEntry<A>] {
        &self.hosts
    }

    pub fn iter(&self) -> slice::Iter<'_, HostEntry<A>> {
        self.hosts.iter()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, address: &A) -> Option<&HostEntry<A>> {
        self.index.get(address).map(|&i| &self.hosts[i])
    }

    /// Number of hosts that were active at publication.
    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn host_snapshots(&self) -> Vec<HostSnapshot<A>> {
        self.hosts.iter().map(|h| h.snapshot()).collect()
    }
}

/// Membership change applied by the writer.
#[derive(Debug, Clone)]
pub enum Transition<A> {
    Added(Arc<HostRecord<A>>),
    MarkedExpired {
        host: Arc<HostRecord<A>>,
        connections: u32,
    },
    ActiveRemoved {
        host: Arc<HostRecord<A>>,
        connections: u32,
    },
    ExpiredRevived {
        host: Arc<HostRecord<A>>,
        connections: u32,
    },
    ExpiredRemoved {
        host: Arc<HostRecord<A>>,
        connections: u32,
    },
}

impl<A> Transition<A> {
    pub fn host(&self) -> &Arc<HostRecord<A>> {
        match self {
            Transition::Added(host)
            | Transition::MarkedExpired { host, .. }
            | Transition::ActiveRemoved { host, .. }
            | Transition::ExpiredRevived { host, .. }
            | Transition::ExpiredRemoved { host, .. } => host,
        }
    }
}

/// Result of one write against the host set.
#[derive(Debug, Clone)]
pub struct Reconciliation<A> {
    pub added: Vec<A>,
    pub removed: Vec<A>,
    /// Transitions in the order they were applied.
    pub transitions: Vec<Transition<A>>,
    pub old_hosts: Vec<HostSnapshot<A>>,
    pub new_hosts: Vec<HostSnapshot<A>>,
}

impl<A> Reconciliation<A> {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

struct HostMap<A> {
    hosts: HashMap<A, Arc<HostRecord<A>>>,
    next_id: u64,
}

/// The hosts of one load balancer.
pub struct HostSet<A> {
    writer: Mutex<HostMap<A>>,
    snapshot: ArcSwap<HostView<A>>,
}

impl<A: Address> HostSet<A> {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(HostMap {
                hosts: HashMap::new(),
                next_id: 0,
            }),
            snapshot: ArcSwap::from_pointee(HostView::empty()),
        }
    }

    /// Current read view. Never blocks.
    pub fn snapshot(&self) -> Guard<Snapshot<A>> {
        self.snapshot.load()
    }

    /// Current read view as an owned handle.
    pub fn snapshot_full(&self) -> Snapshot<A> {
        self.snapshot.load_full()
    }

    /// Look up a reachable host.
    pub fn get(&self, address: &A) -> Option<Arc<HostRecord<A>>> {
        self.snapshot()
            .get(address)
            .map(|h| Arc::clone(h.record()))
    }

    /// Take the single writer.
    pub fn writer(&self) -> HostSetWriter<'_, A> {
        HostSetWriter {
            map: self.writer.lock(),
            snapshot: &self.snapshot,
        }
    }
}

impl<A: Address> Default for HostSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write access to a host set.
pub struct HostSetWriter<'a, A> {
    map: MutexGuard<'a, HostMap<A>>,
    snapshot: &'a ArcSwap<HostView<A>>,
}

impl<A: Address> HostSetWriter<'_, A> {
    /// Look up a host by address.
    pub fn get(&self, address: &A) -> Option<&Arc<HostRecord<A>>> {
        self.map.hosts.get(address)
    }

    /// Apply one discovery batch.
    ///
    /// `host_observer` supplies the observer for records created by this
    /// batch. A batch that only repeats the current state changes nothing.
    pub fn reconcile<F>(
        &mut self,
        events: &[DiscoveryEvent<A>],
        host_observer: F,
    ) -> Reconciliation<A>
    where
        F: Fn(&A) -> Arc<dyn HostObserver>,
    {
        let old_hosts = self.current_hosts();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut transitions = Vec::new();

        for (address, kind) in resolve_batch(events) {
            match kind {
                DiscoveryKind::Available => match self.map.hosts.get(&address) {
                    None => {
                        let id = self.map.next_id;
                        self.map.next_id += 1;
                        let observer = host_observer(&address);
                        let host = Arc::new(HostRecord::new(id, address.clone(), observer));
                        debug!(host = %address, "host added");
                        self.map.hosts.insert(address.clone(), Arc::clone(&host));
                        added.push(address);
                        transitions.push(Transition::Added(host));
                    }
                    Some(host) if host.state() == HostState::ExpiredDraining => {
                        let state = host.revive_expired();
                        debug!(host = %address, state = %state, "expired host revived");
                        transitions.push(Transition::ExpiredRevived {
                            host: Arc::clone(host),
                            connections: host.connection_count(),
                        });
                    }
                    Some(_) => {}
                },
                DiscoveryKind::Unavailable => {
                    let Some(host) = self.map.hosts.get(&address).cloned() else {
                        continue;
                    };
                    if !host.state().is_active() {
                        continue;
                    }

                    if host.remove_if_idle() {
                        self.map.hosts.remove(&address);
                        debug!(host = %address, "active host removed");
                        removed.push(address);
                        transitions.push(Transition::ActiveRemoved {
                            host,
                            connections: 0,
                        });
                    } else {
                        host.expire();
                        let connections = host.connection_count();
                        debug!(host = %address, connections, "host marked expired");
                        transitions.push(Transition::MarkedExpired { host, connections });
                    }
                }
            }
        }

        if !transitions.is_empty() {
            self.publish();
        }

        Reconciliation {
            added,
            removed,
            transitions,
            old_hosts,
            new_hosts: self.current_hosts(),
        }
    }

    /// Remove an expired host whose connections have drained.
    ///
    /// Re-checks state and count under the writer, so a stale signal is a
    /// no-op.
    pub fn evict_drained(&mut self, address: &A) -> Option<Reconciliation<A>> {
        let host = Arc::clone(self.map.hosts.get(address)?);
        if host.state() != HostState::ExpiredDraining {
            return None;
        }

        let old_hosts = self.current_hosts();
        if !host.remove_if_idle() {
            return None;
        }
        self.map.hosts.remove(address);
        self.publish();
        debug!(host = %address, "expired host removed");

        Some(Reconciliation {
            added: Vec::new(),
            removed: vec![address.clone()],
            transitions: vec![Transition::ExpiredRemoved {
                host,
                connections: 0,
            }],
            old_hosts,
            new_hosts: self.current_hosts(),
        })
    }

    /// Feed one request or health check result to `host`. Publishes a new view
    /// when its health changes.
    pub(crate) fn record_result(
        &mut self,
        host: &HostRecord<A>,
        success: bool,
        threshold: u32,
    ) -> Option<HealthTransition> {
        let transition = if success {
            host.record_success(threshold)
        } else {
            host.record_failure(threshold)
        };
        if transition.is_some() {
            self.publish();
        }
        transition
    }

    /// Number of hosts in an active state.
    pub fn active_count(&self) -> usize {
        self.map
            .hosts
            .values()
            .filter(|h| h.state().is_active())
            .count()
    }

    fn current_hosts(&self) -> Vec<HostSnapshot<A>> {
        self.snapshot.load().host_snapshots()
    }

    fn publish(&mut self) {
        self.snapshot.store(Arc::new(HostView::build(&self.map)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopHostObserver;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn noop(_: &SocketAddr) -> Arc<dyn HostObserver> {
        Arc::new(NoopHostObserver)
    }

    fn addresses(set: &HostSet<SocketAddr>) -> Vec<SocketAddr> {
        set.snapshot().iter().map(|h| *h.address()).collect()
    }

    #[test]
    fn test_reconcile_adds_hosts_in_order() {
        let set = HostSet::new();
        let result = set.writer().reconcile(
            &[DiscoveryEvent::available(addr(2)), DiscoveryEvent::available(addr(1))],
            noop,
        );

        assert_eq!(result.added, vec![addr(2), addr(1)]);
        assert!(result.old_hosts.is_empty());
        assert_eq!(result.new_hosts.len(), 2);
        assert_eq!(addresses(&set), vec![addr(2), addr(1)]);
        assert!(set.snapshot().iter().all(|h| h.state() == HostState::ActiveHealthy));
    }

    #[test]
    fn test_replayed_batch_is_noop() {
        let set = HostSet::new();
        let batch = vec![DiscoveryEvent::available(addr(1))];

        assert!(!set.writer().reconcile(&batch, noop).is_empty());
        let before = set.snapshot_full();

        let replay = set.writer().reconcile(&batch, noop);
        assert!(replay.is_empty());
        assert!(Arc::ptr_eq(&before, &set.snapshot_full()));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let set: HostSet<SocketAddr> = HostSet::new();
        assert!(set.writer().reconcile(&[], noop).is_empty());
    }

    #[test]
    fn test_unavailable_without_connections_removes() {
        let set = HostSet::new();
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);
        let host = set.get(&addr(1)).unwrap();

        let result = set.writer().reconcile(&[DiscoveryEvent::unavailable(addr(1))], noop);

        assert_eq!(result.removed, vec![addr(1)]);
        assert!(matches!(
            result.transitions[0],
            Transition::ActiveRemoved { connections: 0, .. }
        ));
        assert_eq!(host.state(), HostState::Removed);
        assert!(set.get(&addr(1)).is_none());
    }

    #[test]
    fn test_unavailable_with_connections_drains() {
        let set = HostSet::new();
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);
        let host = set.get(&addr(1)).unwrap();
        host.acquire_connection();
        host.acquire_connection();

        let result = set.writer().reconcile(&[DiscoveryEvent::unavailable(addr(1))], noop);
        assert!(matches!(
            result.transitions[0],
            Transition::MarkedExpired { connections: 2, .. }
        ));
        assert_eq!(host.state(), HostState::ExpiredDraining);
        assert_eq!(addresses(&set), vec![addr(1)]);

        // Not drained yet
        host.release_connection();
        assert!(set.writer().evict_drained(&addr(1)).is_none());

        host.release_connection();
        let eviction = set.writer().evict_drained(&addr(1)).unwrap();
        assert_eq!(eviction.removed, vec![addr(1)]);
        assert_eq!(host.state(), HostState::Removed);
        assert!(addresses(&set).is_empty());
    }

    #[test]
    fn test_expired_host_revived() {
        let set = HostSet::new();
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);
        let host = set.get(&addr(1)).unwrap();
        host.acquire_connection();
        set.writer().reconcile(&[DiscoveryEvent::unavailable(addr(1))], noop);

        let result = set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);

        assert!(result.added.is_empty());
        assert!(matches!(
            result.transitions[0],
            Transition::ExpiredRevived { connections: 1, .. }
        ));
        assert!(host.is_healthy());
        assert!(Arc::ptr_eq(&host, &set.get(&addr(1)).unwrap()));
    }

    #[test]
    fn test_contradictory_batch_resolves_unavailable() {
        let set = HostSet::new();
        let result = set.writer().reconcile(
            &[
                DiscoveryEvent::available(addr(1)),
                DiscoveryEvent::unavailable(addr(1)),
                DiscoveryEvent::available(addr(2)),
            ],
            noop,
        );

        assert_eq!(result.added, vec![addr(2)]);
        assert_eq!(addresses(&set), vec![addr(2)]);
    }

    #[test]
    fn test_removed_address_returns_as_new_record() {
        let set = HostSet::new();
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);
        let first = set.get(&addr(1)).unwrap();
        set.writer().reconcile(&[DiscoveryEvent::unavailable(addr(1))], noop);
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);

        let second = set.get(&addr(1)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), HostState::Removed);
        assert!(second.is_healthy());
    }

    #[test]
    fn test_active_count_ignores_draining() {
        let set = HostSet::new();
        set.writer().reconcile(
            &[DiscoveryEvent::available(addr(1)), DiscoveryEvent::available(addr(2))],
            noop,
        );
        set.get(&addr(1)).unwrap().acquire_connection();
        set.writer().reconcile(&[DiscoveryEvent::unavailable(addr(1))], noop);

        assert_eq!(set.writer().active_count(), 1);
        assert_eq!(set.snapshot().len(), 2);
    }

    #[test]
    fn test_old_view_keeps_its_states() {
        let set = HostSet::new();
        set.writer().reconcile(
            &[DiscoveryEvent::available(addr(1)), DiscoveryEvent::available(addr(2))],
            noop,
        );
        let before = set.snapshot_full();

        set.writer().reconcile(
            &[
                DiscoveryEvent::unavailable(addr(1)),
                DiscoveryEvent::unavailable(addr(2)),
                DiscoveryEvent::available(addr(3)),
            ],
            noop,
        );

        // The records moved on, the view published before did not
        assert_eq!(before.get(&addr(1)).unwrap().record().state(), HostState::Removed);
        assert_eq!(before.get(&addr(1)).unwrap().state(), HostState::ActiveHealthy);
        assert_eq!(before.active_count(), 2);

        let after = set.snapshot();
        assert_eq!(after.active_count(), 1);
        assert!(after.get(&addr(1)).is_none());
        assert_eq!(after.get(&addr(3)).unwrap().state(), HostState::ActiveHealthy);
    }

    #[test]
    fn test_health_change_publishes_view() {
        let set = HostSet::new();
        set.writer().reconcile(&[DiscoveryEvent::available(addr(1))], noop);
        let host = set.get(&addr(1)).unwrap();
        let before = set.snapshot_full();

        let mut writer = set.writer();
        assert_eq!(writer.record_result(&host, false, 2), None);
        drop(writer);
        assert!(Arc::ptr_eq(&before, &set.snapshot_full()));

        let mut writer = set.writer();
        assert_eq!(
            writer.record_result(&host, false, 2),
            Some(HealthTransition::MarkedUnhealthy)
        );
        drop(writer);
        assert_eq!(
            set.snapshot().get(&addr(1)).unwrap().state(),
            HostState::ActiveUnhealthy
        );
        assert_eq!(before.get(&addr(1)).unwrap().state(), HostState::ActiveHealthy);
    }

    #[test]
    fn test_lookup_by_address() {
        let set = HostSet::new();
        let events: Vec<_> = (1..=50).map(|p| DiscoveryEvent::available(addr(p))).collect();
        set.writer().reconcile(&events, noop);

        let view = set.snapshot();
        for port in 1..=50 {
            assert_eq!(*view.get(&addr(port)).unwrap().address(), addr(port));
        }
        assert!(view.get(&addr(51)).is_none());
        assert_eq!(*view.hosts()[10].address(), addr(11));
    }
}
