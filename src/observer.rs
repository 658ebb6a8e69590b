//! Notification sink for host set and host health transitions.
//!
//! Every callback is a notification, never a command. Implementations only
//! override what they care about; all methods default to no-ops.

use crate::discovery::DiscoveryEvent;
use crate::error::{NoActiveHostError, NoAvailableHostError};
use crate::host::{Address, HostSnapshot};
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, enabled, error, Level};

/// Per-host transition callbacks.
pub trait HostObserver: Send + Sync {
    /// Host left discovery while still holding connections.
    fn on_host_marked_expired(&self, _connection_count: u32) {}

    /// Active host left discovery and was removed immediately.
    fn on_active_host_removed(&self, _connection_count: u32) {}

    /// Expired host was rediscovered before it drained.
    fn on_expired_host_revived(&self, _connection_count: u32) {}

    /// Expired host drained and was removed.
    fn on_expired_host_removed(&self, _connection_count: u32) {}

    /// Host crossed the failure threshold.
    fn on_host_marked_unhealthy(&self, _cause: Option<&(dyn Error + 'static)>) {}

    /// Unhealthy host recovered.
    fn on_host_revived(&self) {}
}

/// Load balancer level callbacks.
pub trait LoadBalancerObserver<A: Address>: Send + Sync {
    /// Observer for a newly created host record.
    fn host_observer(&self, _address: &A) -> Arc<dyn HostObserver> {
        Arc::new(NoopHostObserver)
    }

    fn on_service_discovery_event(&self, _events: &[DiscoveryEvent<A>]) {}

    /// Full host set before and after a change.
    fn on_hosts_update(&self, _old_hosts: &[HostSnapshot<A>], _new_hosts: &[HostSnapshot<A>]) {}

    fn on_no_available_host(&self, _error: &NoAvailableHostError) {}

    fn on_no_active_host(&self, _hosts: &[HostSnapshot<A>], _error: &NoActiveHostError<A>) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<A: Address> LoadBalancerObserver<A> for NoopObserver {}

/// Host observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHostObserver;

impl HostObserver for NoopHostObserver {}

/// Run an observer callback, containing any panic it raises.
///
/// A misbehaving observer must never unwind through the host set writer.
pub(crate) fn notify<F: FnOnce()>(callback: &'static str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback, "observer panicked, notification dropped");
    }
}

/// Ask the observer for a host observer, falling back to a no-op one.
pub(crate) fn host_observer_for<A: Address>(
    observer: &dyn LoadBalancerObserver<A>,
    address: &A,
) -> Arc<dyn HostObserver> {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.host_observer(address))) {
        Ok(host_observer) => host_observer,
        Err(_) => {
            error!(
                callback = "host_observer",
                address = %address,
                "observer panicked, using no-op host observer"
            );
            Arc::new(NoopHostObserver)
        }
    }
}

/// Observer that reports every callback through `tracing` at debug level.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    description: Arc<str>,
}

impl LoggingObserver {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into().into(),
        }
    }
}

impl<A: Address> LoadBalancerObserver<A> for LoggingObserver {
    fn host_observer(&self, address: &A) -> Arc<dyn HostObserver> {
        Arc::new(LoggingHostObserver {
            description: Arc::clone(&self.description),
            address: address.to_string(),
        })
    }

    fn on_service_discovery_event(&self, events: &[DiscoveryEvent<A>]) {
        debug!(
            lb = %self.description,
            count = events.len(),
            events = ?events,
            "service discovery event"
        );
    }

    fn on_hosts_update(&self, old_hosts: &[HostSnapshot<A>], new_hosts: &[HostSnapshot<A>]) {
        if enabled!(Level::DEBUG) {
            let healthy = new_hosts
                .iter()
                .filter(|h| h.state == crate::host::HostState::ActiveHealthy)
                .count();
            debug!(
                lb = %self.description,
                old_count = old_hosts.len(),
                new_count = new_hosts.len(),
                new_healthy = healthy,
                old_hosts = ?old_hosts,
                new_hosts = ?new_hosts,
                "hosts updated"
            );
        }
    }

    fn on_no_available_host(&self, error: &NoAvailableHostError) {
        debug!(lb = %self.description, error = %error, "no available host");
    }

    fn on_no_active_host(&self, hosts: &[HostSnapshot<A>], error: &NoActiveHostError<A>) {
        debug!(
            lb = %self.description,
            host_count = hosts.len(),
            hosts = ?hosts,
            error = %error,
            "no active host"
        );
    }
}

struct LoggingHostObserver {
    description: Arc<str>,
    address: String,
}

impl HostObserver for LoggingHostObserver {
    fn on_host_marked_expired(&self, connection_count: u32) {
        debug!(
            lb = %self.description,
            host = %self.address,
            connection_count,
            "host marked expired"
        );
    }

    fn on_active_host_removed(&self, connection_count: u32) {
        debug!(
            lb = %self.description,
            host = %self.address,
            connection_count,
            "active host removed"
        );
    }

    fn on_expired_host_revived(&self, connection_count: u32) {
        debug!(
            lb = %self.description,
            host = %self.address,
            connection_count,
            "expired host revived"
        );
    }

    fn on_expired_host_removed(&self, connection_count: u32) {
        debug!(
            lb = %self.description,
            host = %self.address,
            connection_count,
            "expired host removed"
        );
    }

    fn on_host_marked_unhealthy(&self, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => debug!(
                lb = %self.description,
                host = %self.address,
                cause = %cause,
                "host marked unhealthy"
            ),
            None => debug!(lb = %self.description, host = %self.address, "host marked unhealthy"),
        }
    }

    fn on_host_revived(&self) {
        debug!(lb = %self.description, host = %self.address, "host revived");
    }
}

/// Fans every callback out to several observers.
pub struct MultiObserver<A> {
    observers: Vec<Arc<dyn LoadBalancerObserver<A>>>,
}

impl<A: Address> MultiObserver<A> {
    pub fn new(observers: Vec<Arc<dyn LoadBalancerObserver<A>>>) -> Self {
        Self { observers }
    }
}

impl<A: Address> LoadBalancerObserver<A> for MultiObserver<A> {
    fn host_observer(&self, address: &A) -> Arc<dyn HostObserver> {
        Arc::new(MultiHostObserver {
            observers: self
                .observers
                .iter()
                .map(|o| host_observer_for(o.as_ref(), address))
                .collect(),
        })
    }

    fn on_service_discovery_event(&self, events: &[DiscoveryEvent<A>]) {
        for o in &self.observers {
            notify("on_service_discovery_event", || o.on_service_discovery_event(events));
        }
    }

    fn on_hosts_update(&self, old_hosts: &[HostSnapshot<A>], new_hosts: &[HostSnapshot<A>]) {
        for o in &self.observers {
            notify("on_hosts_update", || o.on_hosts_update(old_hosts, new_hosts));
        }
    }

    fn on_no_available_host(&self, error: &NoAvailableHostError) {
        for o in &self.observers {
            notify("on_no_available_host", || o.on_no_available_host(error));
        }
    }

    fn on_no_active_host(&self, hosts: &[HostSnapshot<A>], error: &NoActiveHostError<A>) {
        for o in &self.observers {
            notify("on_no_active_host", || o.on_no_active_host(hosts, error));
        }
    }
}

struct MultiHostObserver {
    observers: Vec<Arc<dyn HostObserver>>,
}

impl HostObserver for MultiHostObserver {
    fn on_host_marked_expired(&self, connection_count: u32) {
        for o in &self.observers {
            notify("on_host_marked_expired", || o.on_host_marked_expired(connection_count));
        }
    }

    fn on_active_host_removed(&self, connection_count: u32) {
        for o in &self.observers {
            notify("on_active_host_removed", || o.on_active_host_removed(connection_count));
        }
    }

    fn on_expired_host_revived(&self, connection_count: u32) {
        for o in &self.observers {
            notify("on_expired_host_revived", || o.on_expired_host_revived(connection_count));
        }
    }

    fn on_expired_host_removed(&self, connection_count: u32) {
        for o in &self.observers {
            notify("on_expired_host_removed", || o.on_expired_host_removed(connection_count));
        }
    }

    fn on_host_marked_unhealthy(&self, cause: Option<&(dyn Error + 'static)>) {
        for o in &self.observers {
            notify("on_host_marked_unhealthy", || o.on_host_marked_unhealthy(cause));
        }
    }

    fn on_host_revived(&self) {
        for o in &self.observers {
            notify("on_host_revived", || o.on_host_revived());
        }
    }
}
