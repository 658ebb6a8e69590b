//! Observer that feeds the metrics collector.

use super::{FailureReason, MetricsCollector, TransitionKind};
use crate::discovery::DiscoveryEvent;
use crate::error::{NoActiveHostError, NoAvailableHostError};
use crate::host::{Address, HostSnapshot};
use crate::observer::{HostObserver, LoadBalancerObserver};
use std::error::Error;
use std::sync::Arc;

/// Records every notification as prometheus metrics.
#[derive(Clone)]
pub struct MetricsObserver {
    lb: Arc<str>,
    collector: MetricsCollector,
}

impl MetricsObserver {
    pub fn new(lb: impl Into<String>, collector: MetricsCollector) -> Self {
        Self {
            lb: lb.into().into(),
            collector,
        }
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

impl<A: Address> LoadBalancerObserver<A> for MetricsObserver {
    fn host_observer(&self, _address: &A) -> Arc<dyn HostObserver> {
        Arc::new(self.clone())
    }

    fn on_service_discovery_event(&self, events: &[DiscoveryEvent<A>]) {
        for event in events {
            self.collector.record_discovery_event(&self.lb, event.kind);
        }
    }

    fn on_hosts_update(&self, _old_hosts: &[HostSnapshot<A>], new_hosts: &[HostSnapshot<A>]) {
        self.collector
            .set_host_states(&self.lb, new_hosts.iter().map(|h| h.state));
    }

    fn on_no_available_host(&self, _error: &NoAvailableHostError) {
        self.collector
            .record_selection_failure(&self.lb, FailureReason::NoAvailableHost);
    }

    fn on_no_active_host(&self, _hosts: &[HostSnapshot<A>], _error: &NoActiveHostError<A>) {
        self.collector
            .record_selection_failure(&self.lb, FailureReason::NoActiveHost);
    }
}

impl HostObserver for MetricsObserver {
    fn on_host_marked_expired(&self, _connection_count: u32) {
        self.collector
            .record_transition(&self.lb, TransitionKind::MarkedExpired);
    }

    fn on_active_host_removed(&self, _connection_count: u32) {
        self.collector
            .record_transition(&self.lb, TransitionKind::ActiveRemoved);
    }

    fn on_expired_host_revived(&self, _connection_count: u32) {
        self.collector
            .record_transition(&self.lb, TransitionKind::ExpiredRevived);
    }

    fn on_expired_host_removed(&self, _connection_count: u32) {
        self.collector
            .record_transition(&self.lb, TransitionKind::ExpiredRemoved);
    }

    fn on_host_marked_unhealthy(&self, _cause: Option<&(dyn Error + 'static)>) {
        self.collector
            .record_transition(&self.lb, TransitionKind::MarkedUnhealthy);
        self.collector.shift_health(&self.lb, false);
    }

    fn on_host_revived(&self) {
        self.collector
            .record_transition(&self.lb, TransitionKind::Revived);
        self.collector.shift_health(&self.lb, true);
    }
}
