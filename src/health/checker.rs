//! Active health checker.
//!
//! Probes hosts that have been marked unhealthy until they recover, leave
//! discovery, or the load balancer closes. Each host has at most one probe
//! pending at a time; the next one is only scheduled once the previous result
//! has been applied.

use super::{HealthError, HealthProbe};
use crate::executor::{Cancellable, Executor};
use crate::host::{Address, HostRecord, HostState};
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Schedules probes for unhealthy hosts and owns their cancellation handles.
pub struct HealthChecker<A> {
    probe: Arc<dyn HealthProbe<A>>,
    executor: Arc<dyn Executor>,
    interval: Duration,
    jitter: Duration,
    /// Pending probe per address.
    probes: Mutex<HashMap<A, Box<dyn Cancellable>>>,
    closed: AtomicBool,
}

impl<A: Address> HealthChecker<A> {
    pub fn new(
        probe: Arc<dyn HealthProbe<A>>,
        executor: Arc<dyn Executor>,
        interval: Duration,
        jitter: Duration,
    ) -> Self {
        Self {
            probe,
            executor,
            interval,
            jitter,
            probes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Delay before the next probe: the interval plus a random jitter.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Schedule the next probe for `host`, replacing any pending one.
    ///
    /// `on_result` receives the generation captured now and the probe
    /// outcome. It is skipped when the host has transitioned or been removed
    /// in the meantime. Callers hold the host set writer, which orders this
    /// call against the completion of the probe it replaces.
    ///
    /// Returns `false` once the checker is closed.
    pub fn schedule<F>(&self, host: &Arc<HostRecord<A>>, on_result: F) -> bool
    where
        F: FnOnce(u64, Result<(), HealthError>) + Send + 'static,
    {
        let generation = host.generation();
        let record = Arc::downgrade(host);
        let address = host.address().clone();
        let probe = Arc::clone(&self.probe);
        let delay = self.next_delay();

        let task = async move {
            let Some(host) = record.upgrade() else {
                return;
            };
            let result = probe.probe(host.address()).await;
            if host.generation() != generation || host.state() == HostState::Removed {
                debug!(host = %host.address(), "discarding stale probe result");
                return;
            }
            on_result(generation, result);
        }
        .boxed();

        // Closed is checked under the map lock, which `close` also takes
        // before draining, so nothing is queued behind it.
        let mut probes = self.probes.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let handle = self.executor.schedule_after(delay, task);
        debug!(host = %address, delay = ?delay, "health probe scheduled");
        if let Some(previous) = probes.insert(address, handle) {
            previous.cancel();
        }
        true
    }

    /// Cancel the pending probe for `address`, if any.
    pub fn cancel(&self, address: &A) -> bool {
        match self.probes.lock().remove(address) {
            Some(handle) => {
                handle.cancel();
                debug!(host = %address, "health probe cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending probe and refuse new ones.
    pub fn close(&self) {
        let mut probes = self.probes.lock();
        self.closed.store(true, Ordering::Release);
        let pending: Vec<_> = probes.drain().collect();
        drop(probes);
        for (_, handle) in &pending {
            handle.cancel();
        }
        info!(cancelled = pending.len(), "health checker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_probing(&self, address: &A) -> bool {
        self.probes.lock().contains_key(address)
    }

    /// Number of hosts with a pending probe.
    pub fn probing_count(&self) -> usize {
        self.probes.lock().len()
    }
}
