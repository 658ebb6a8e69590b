//! Metrics collector using prometheus-client.
//!
//! Provides counters for discovery events, host transitions and selection
//! failures, and gauges for the host population by state.

use crate::discovery::DiscoveryKind;
use crate::host::HostState;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Labels for discovery event metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DiscoveryLabels {
    pub lb: String,
    pub kind: DiscoveryKindLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum DiscoveryKindLabel {
    Available,
    Unavailable,
}

/// Labels for host transition metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    pub lb: String,
    pub transition: TransitionKind,
}

/// Host transition being counted.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum TransitionKind {
    MarkedExpired,
    ActiveRemoved,
    ExpiredRevived,
    ExpiredRemoved,
    MarkedUnhealthy,
    Revived,
}

/// Labels for host population gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HostStateLabels {
    pub lb: String,
    pub state: HostStateLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HostStateLabel {
    ActiveHealthy,
    ActiveUnhealthy,
    ExpiredDraining,
}

/// Labels for selection failure metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub lb: String,
    pub reason: FailureReason,
}

/// Why a selection failed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FailureReason {
    NoAvailableHost,
    NoActiveHost,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Discovery events received.
    discovery_events_total: Family<DiscoveryLabels, Counter>,
    /// Host transitions applied.
    host_transitions_total: Family<TransitionLabels, Counter>,
    /// Hosts per state after the last update.
    hosts: Family<HostStateLabels, Gauge>,
    /// Reported selection failure episodes.
    selection_failures_total: Family<FailureLabels, Counter>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let discovery_events_total = Family::<DiscoveryLabels, Counter>::default();
        let host_transitions_total = Family::<TransitionLabels, Counter>::default();
        let hosts = Family::<HostStateLabels, Gauge>::default();
        let selection_failures_total = Family::<FailureLabels, Counter>::default();

        registry.register(
            "hostlb_discovery_events",
            "Total number of service discovery events received",
            discovery_events_total.clone(),
        );
        registry.register(
            "hostlb_host_transitions",
            "Total number of host state transitions",
            host_transitions_total.clone(),
        );
        registry.register(
            "hostlb_hosts",
            "Number of hosts by state",
            hosts.clone(),
        );
        registry.register(
            "hostlb_selection_failures",
            "Total number of reported host selection failures",
            selection_failures_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                discovery_events_total,
                host_transitions_total,
                hosts,
                selection_failures_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Render all metrics in the text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.inner.registry)?;
        Ok(buffer)
    }

    pub fn record_discovery_event(&self, lb: &str, kind: DiscoveryKind) {
        let labels = DiscoveryLabels {
            lb: lb.to_string(),
            kind: match kind {
                DiscoveryKind::Available => DiscoveryKindLabel::Available,
                DiscoveryKind::Unavailable => DiscoveryKindLabel::Unavailable,
            },
        };
        self.inner.discovery_events_total.get_or_create(&labels).inc();
    }

    pub fn record_transition(&self, lb: &str, transition: TransitionKind) {
        let labels = TransitionLabels {
            lb: lb.to_string(),
            transition,
        };
        self.inner.host_transitions_total.get_or_create(&labels).inc();
    }

    pub fn record_selection_failure(&self, lb: &str, reason: FailureReason) {
        let labels = FailureLabels {
            lb: lb.to_string(),
            reason,
        };
        self.inner.selection_failures_total.get_or_create(&labels).inc();
    }

    /// Replace the host population gauges with the given states.
    pub fn set_host_states<I>(&self, lb: &str, states: I)
    where
        I: IntoIterator<Item = HostState>,
    {
        let (mut healthy, mut unhealthy, mut draining) = (0, 0, 0);
        for state in states {
            match state {
                HostState::ActiveHealthy => healthy += 1,
                HostState::ActiveUnhealthy => unhealthy += 1,
                HostState::ExpiredDraining => draining += 1,
                HostState::Removed => {}
            }
        }

        for (state, count) in [
            (HostStateLabel::ActiveHealthy, healthy),
            (HostStateLabel::ActiveUnhealthy, unhealthy),
            (HostStateLabel::ExpiredDraining, draining),
        ] {
            let labels = HostStateLabels {
                lb: lb.to_string(),
                state,
            };
            self.inner.hosts.get_or_create(&labels).set(count);
        }
    }

    /// Adjust the healthy and unhealthy gauges after a health transition.
    pub fn shift_health(&self, lb: &str, now_healthy: bool) {
        let (from, to) = if now_healthy {
            (HostStateLabel::ActiveUnhealthy, HostStateLabel::ActiveHealthy)
        } else {
            (HostStateLabel::ActiveHealthy, HostStateLabel::ActiveUnhealthy)
        };
        let from = HostStateLabels {
            lb: lb.to_string(),
            state: from,
        };
        let to = HostStateLabels {
            lb: lb.to_string(),
            state: to,
        };
        self.inner.hosts.get_or_create(&from).dec();
        self.inner.hosts.get_or_create(&to).inc();
    }

    /// Current value of a host gauge.
    pub fn host_count(&self, lb: &str, state: HostState) -> i64 {
        let state = match state {
            HostState::ActiveHealthy => HostStateLabel::ActiveHealthy,
            HostState::ActiveUnhealthy => HostStateLabel::ActiveUnhealthy,
            HostState::ExpiredDraining => HostStateLabel::ExpiredDraining,
            HostState::Removed => return 0,
        };
        let labels = HostStateLabels {
            lb: lb.to_string(),
            state,
        };
        self.inner.hosts.get_or_create(&labels).get()
    }

    /// Current value of a transition counter.
    pub fn transition_count(&self, lb: &str, transition: TransitionKind) -> u64 {
        let labels = TransitionLabels {
            lb: lb.to_string(),
            transition,
        };
        self.inner.host_transitions_total.get_or_create(&labels).get()
    }

    /// Current value of a selection failure counter.
    pub fn failure_count(&self, lb: &str, reason: FailureReason) -> u64 {
        let labels = FailureLabels {
            lb: lb.to_string(),
            reason,
        };
        self.inner.selection_failures_total.get_or_create(&labels).get()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
