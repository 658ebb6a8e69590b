//! Load balancer core: ties the host set, selection and health checking
//! together and reports every transition to the observer.
//!
//! Writes (discovery, reported outcomes, probe results, drain evictions) are
//! serialized by the host set writer and notify the observer while still
//! holding it, so notifications arrive in the order transitions were applied.
//! Observers must not call back into the same load balancer from a callback.

use crate::config::{Config, HealthConfig, LoadBalancerConfig};
use crate::discovery::DiscoveryEvent;
use crate::error::{NoActiveHostError, NoAvailableHostError, SelectError};
use crate::executor::Executor;
use crate::health::{HealthChecker, HealthError, HealthProbe};
use crate::host::{
    Address, HealthTransition, HostRecord, HostSet, HostSnapshot, HostState, Reconciliation,
    Snapshot, Transition,
};
use crate::observer::{host_observer_for, notify, LoadBalancerObserver, NoopObserver};
use crate::selection::{strategy_for, SelectionStrategy};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Result of using a selected host, reported by the transport.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Success,
    Failure(Option<&'a (dyn Error + 'static)>),
}

/// Builder for [`LoadBalancerCore`].
pub struct LoadBalancerBuilder<A: Address> {
    load_balancer: LoadBalancerConfig,
    health: HealthConfig,
    strategy: Option<Arc<dyn SelectionStrategy<A>>>,
    observer: Arc<dyn LoadBalancerObserver<A>>,
    probe: Arc<dyn HealthProbe<A>>,
    executor: Arc<dyn Executor>,
}

impl<A: Address> LoadBalancerBuilder<A> {
    /// Take both the load balancer and health sections of a configuration.
    pub fn config(mut self, config: &Config) -> Self {
        self.load_balancer = config.load_balancer.clone();
        self.health = config.health.clone();
        self
    }

    pub fn load_balancer(mut self, config: LoadBalancerConfig) -> Self {
        self.load_balancer = config;
        self
    }

    pub fn health(mut self, config: HealthConfig) -> Self {
        self.health = config;
        self
    }

    /// Use a custom strategy instead of the configured algorithm.
    pub fn strategy(mut self, strategy: Arc<dyn SelectionStrategy<A>>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn LoadBalancerObserver<A>>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> LoadBalancerCore<A> {
        let strategy = self.strategy.unwrap_or_else(|| {
            strategy_for(&self.load_balancer.algorithm, self.load_balancer.fail_open)
        });
        let checker = HealthChecker::new(
            self.probe,
            self.executor,
            self.health.probe_interval,
            self.health.probe_jitter,
        );

        info!(
            lb = %self.load_balancer.description,
            strategy = strategy.name(),
            fail_open = self.load_balancer.fail_open,
            unhealthy_threshold = self.health.unhealthy_threshold,
            healthy_threshold = self.health.healthy_threshold,
            "load balancer created"
        );

        LoadBalancerCore {
            inner: Arc::new(Inner {
                description: self.load_balancer.description,
                hosts: HostSet::new(),
                strategy,
                checker,
                observer: self.observer,
                unhealthy_threshold: self.health.unhealthy_threshold.max(1),
                healthy_threshold: self.health.healthy_threshold.max(1),
                closed: AtomicBool::new(false),
                no_available_reported: AtomicBool::new(false),
                no_active_reported: AtomicBool::new(false),
            }),
        }
    }
}

/// Host selection and host set management for one load balancer.
///
/// Cheap to clone; clones share the same state.
pub struct LoadBalancerCore<A: Address> {
    inner: Arc<Inner<A>>,
}

impl<A: Address> Clone for LoadBalancerCore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A: Address> {
    description: String,
    hosts: HostSet<A>,
    strategy: Arc<dyn SelectionStrategy<A>>,
    checker: HealthChecker<A>,
    observer: Arc<dyn LoadBalancerObserver<A>>,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
    closed: AtomicBool,
    /// Set while a no-available-host episode has been reported.
    no_available_reported: AtomicBool,
    /// Set while a no-active-host episode has been reported.
    no_active_reported: AtomicBool,
}

impl<A: Address> LoadBalancerCore<A> {
    /// Start building a load balancer with default configuration.
    pub fn builder(
        probe: Arc<dyn HealthProbe<A>>,
        executor: Arc<dyn Executor>,
    ) -> LoadBalancerBuilder<A> {
        LoadBalancerBuilder {
            load_balancer: LoadBalancerConfig::default(),
            health: HealthConfig::default(),
            strategy: None,
            observer: Arc::new(NoopObserver),
            probe,
            executor,
        }
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Pick a host for a request.
    ///
    /// Never blocks and never retries. Distinguishes "nothing discovered"
    /// from "hosts present but none usable". Eligibility is judged on one
    /// published view; reconciliation in flight never shows through.
    pub fn select(&self) -> Result<Arc<HostRecord<A>>, SelectError<A>> {
        let inner = &self.inner;
        let view = inner.hosts.snapshot();

        if view.active_count() == 0 {
            let error = NoAvailableHostError {
                description: inner.description.clone(),
            };
            if !inner.no_available_reported.swap(true, Ordering::AcqRel) {
                warn!(lb = %inner.description, hosts = view.len(), "no available hosts");
                notify("on_no_available_host", || {
                    inner.observer.on_no_available_host(&error)
                });
            }
            return Err(error.into());
        }

        match inner.strategy.select(view.hosts()) {
            Some(host) => {
                if inner.no_active_reported.load(Ordering::Relaxed) {
                    inner.no_active_reported.store(false, Ordering::Relaxed);
                }
                debug!(
                    lb = %inner.description,
                    host = %host.address(),
                    state = %host.state(),
                    "selected host"
                );
                Ok(host)
            }
            None => {
                let hosts = view.host_snapshots();
                let error = NoActiveHostError {
                    description: inner.description.clone(),
                    hosts: hosts.clone(),
                };
                if !inner.no_active_reported.swap(true, Ordering::AcqRel) {
                    warn!(lb = %inner.description, hosts = hosts.len(), "no active hosts");
                    notify("on_no_active_host", || {
                        inner.observer.on_no_active_host(&hosts, &error)
                    });
                }
                Err(error.into())
            }
        }
    }

    /// Apply a discovery batch.
    ///
    /// Returns `None` once the load balancer is closed.
    pub fn on_discovery_events(
        &self,
        events: &[DiscoveryEvent<A>],
    ) -> Option<Reconciliation<A>> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            warn!(
                lb = %inner.description,
                count = events.len(),
                "load balancer closed, ignoring discovery events"
            );
            return None;
        }

        let mut writer = inner.hosts.writer();
        let observer = inner.observer.as_ref();
        let result = writer.reconcile(events, |address| host_observer_for(observer, address));

        if result.is_empty() {
            debug!(
                lb = %inner.description,
                count = events.len(),
                "discovery batch changed nothing"
            );
            return Some(result);
        }

        for transition in &result.transitions {
            inner.apply_effects(transition);
        }
        notify("on_service_discovery_event", || observer.on_service_discovery_event(events));
        notify("on_hosts_update", || {
            observer.on_hosts_update(&result.old_hosts, &result.new_hosts)
        });

        if writer.active_count() > 0 {
            inner.no_available_reported.store(false, Ordering::Release);
        }
        inner.no_active_reported.store(false, Ordering::Release);
        drop(writer);

        info!(
            lb = %inner.description,
            added = result.added.len(),
            removed = result.removed.len(),
            hosts = result.new_hosts.len(),
            "host set reconciled"
        );
        Some(result)
    }

    /// Report how a request to `address` went.
    pub fn report_outcome(&self, address: &A, outcome: Outcome<'_>) {
        let inner = &self.inner;
        let mut writer = inner.hosts.writer();
        let Some(host) = writer.get(address).cloned() else {
            debug!(lb = %inner.description, host = %address, "outcome for unknown host ignored");
            return;
        };

        match outcome {
            Outcome::Success => {
                let transition = writer.record_result(&host, true, inner.healthy_threshold);
                if transition == Some(HealthTransition::Revived) {
                    inner.on_revived(&host);
                }
            }
            Outcome::Failure(cause) => {
                let transition = writer.record_result(&host, false, inner.unhealthy_threshold);
                if transition == Some(HealthTransition::MarkedUnhealthy) {
                    inner.on_marked_unhealthy(&host, cause);
                }
            }
        }
        drop(writer);
    }

    /// Attribute a new connection to `address`. Returns `false` if the host
    /// is unknown or already removed.
    pub fn report_connection_opened(&self, address: &A) -> bool {
        match self.inner.hosts.get(address) {
            Some(host) => host.acquire_connection(),
            None => false,
        }
    }

    /// A connection to `address` closed. Evicts a drained expired host.
    pub fn report_connection_closed(&self, address: &A) {
        let inner = &self.inner;
        let Some(host) = inner.hosts.get(address) else {
            return;
        };
        if host.release_connection() != Some(0) {
            return;
        }

        let mut writer = inner.hosts.writer();
        if let Some(result) = writer.evict_drained(address) {
            for transition in &result.transitions {
                inner.apply_effects(transition);
            }
            let observer = inner.observer.as_ref();
            notify("on_hosts_update", || {
                observer.on_hosts_update(&result.old_hosts, &result.new_hosts)
            });
            info!(lb = %inner.description, host = %address, "drained host evicted");
        }
    }

    /// Stop accepting discovery events and cancel all probes.
    ///
    /// Hosts already handed out are left alone.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.checker.close();
        info!(lb = %inner.description, "load balancer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Reachable host by address.
    pub fn host(&self, address: &A) -> Option<Arc<HostRecord<A>>> {
        self.inner.hosts.get(address)
    }

    /// Copy of the current host set.
    pub fn hosts(&self) -> Vec<HostSnapshot<A>> {
        self.inner.hosts.snapshot().host_snapshots()
    }

    /// Immutable view of the current host set.
    pub fn snapshot(&self) -> Snapshot<A> {
        self.inner.hosts.snapshot_full()
    }

    /// Whether a probe is pending for `address`.
    pub fn is_probing(&self, address: &A) -> bool {
        self.inner.checker.is_probing(address)
    }
}

impl<A: Address> Inner<A> {
    /// Per-host notification and probe bookkeeping for a membership change.
    fn apply_effects(self: &Arc<Self>, transition: &Transition<A>) {
        match transition {
            Transition::Added(_) => {}
            Transition::MarkedExpired { host, connections } => {
                self.checker.cancel(host.address());
                notify("on_host_marked_expired", || {
                    host.observer().on_host_marked_expired(*connections)
                });
            }
            Transition::ActiveRemoved { host, connections } => {
                self.checker.cancel(host.address());
                notify("on_active_host_removed", || {
                    host.observer().on_active_host_removed(*connections)
                });
            }
            Transition::ExpiredRevived { host, connections } => {
                notify("on_expired_host_revived", || {
                    host.observer().on_expired_host_revived(*connections)
                });
                if host.state() == HostState::ActiveUnhealthy {
                    self.schedule_probe(host);
                }
            }
            Transition::ExpiredRemoved { host, connections } => {
                self.checker.cancel(host.address());
                notify("on_expired_host_removed", || {
                    host.observer().on_expired_host_removed(*connections)
                });
            }
        }
    }

    fn on_marked_unhealthy(
        self: &Arc<Self>,
        host: &Arc<HostRecord<A>>,
        cause: Option<&(dyn Error + 'static)>,
    ) {
        match cause {
            Some(cause) => warn!(
                lb = %self.description,
                host = %host.address(),
                cause = %cause,
                "host marked unhealthy"
            ),
            None => warn!(lb = %self.description, host = %host.address(), "host marked unhealthy"),
        }
        notify("on_host_marked_unhealthy", || {
            host.observer().on_host_marked_unhealthy(cause)
        });
        self.schedule_probe(host);
    }

    fn on_revived(&self, host: &Arc<HostRecord<A>>) {
        self.checker.cancel(host.address());
        info!(lb = %self.description, host = %host.address(), "host revived");
        notify("on_host_revived", || host.observer().on_host_revived());
    }

    fn schedule_probe(self: &Arc<Self>, host: &Arc<HostRecord<A>>) {
        let core = Arc::downgrade(self);
        let address = host.address().clone();
        self.checker.schedule(host, move |generation, result| {
            if let Some(inner) = core.upgrade() {
                inner.on_probe_result(&address, generation, result);
            }
        });
    }

    fn on_probe_result(
        self: &Arc<Self>,
        address: &A,
        generation: u64,
        result: Result<(), HealthError>,
    ) {
        if self.closed.load(Ordering::Acquire) {
            debug!(lb = %self.description, host = %address, "load balancer closed, result dropped");
            return;
        }
        let mut writer = self.hosts.writer();
        let Some(host) = writer.get(address).cloned() else {
            return;
        };
        if host.generation() != generation || host.state() != HostState::ActiveUnhealthy {
            debug!(lb = %self.description, host = %address, "discarding stale probe result");
            return;
        }

        match result {
            Ok(()) => {
                debug!(lb = %self.description, host = %address, "health probe passed");
                let transition = writer.record_result(&host, true, self.healthy_threshold);
                if transition == Some(HealthTransition::Revived) {
                    self.on_revived(&host);
                } else {
                    self.schedule_probe(&host);
                }
            }
            Err(e) => {
                debug!(lb = %self.description, host = %address, error = %e, "health probe failed");
                writer.record_result(&host, false, self.unhealthy_threshold);
                self.schedule_probe(&host);
            }
        }
        drop(writer);
    }
}
