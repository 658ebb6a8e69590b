//! Metrics collection and exposition.

mod collector;
mod observer;

pub use collector::{FailureReason, MetricsCollector, TransitionKind};
pub use observer::MetricsObserver;
