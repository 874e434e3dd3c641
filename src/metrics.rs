//! Metric sinks for guard events.

use crate::state::GuardState;
use std::time::Duration;

/// Trait for metrics sinks that can receive guard events.
///
/// Every method receives the guard's name so one sink can serve several
/// guards.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_transition(&self, guard: &str, from: GuardState, to: GuardState);

    /// Records a call refused by an open guard.
    fn record_refusal(&self, guard: &str);

    /// Records a call admitted as a recovery trial.
    fn record_trial(&self, guard: &str);

    /// Records the result of an operation that was allowed to run.
    fn record_call(&self, guard: &str, success: bool, duration: Duration);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_transition(&self, _guard: &str, _from: GuardState, _to: GuardState) {}
    fn record_refusal(&self, _guard: &str) {}
    fn record_trial(&self, _guard: &str) {}
    fn record_call(&self, _guard: &str, _success: bool, _duration: Duration) {}
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use super::MetricSink;
    use crate::state::GuardState;
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
    use prometheus_client::registry::Registry;
    use std::time::Duration;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct GuardLabels {
        guard: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        guard: String,
        from: String,
        to: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct CallLabels {
        guard: String,
        outcome: String,
    }

    /// Metric sink that feeds a Prometheus registry.
    #[derive(Clone)]
    pub struct PrometheusSink {
        transitions: Family<TransitionLabels, Counter>,
        refusals: Family<GuardLabels, Counter>,
        trials: Family<GuardLabels, Counter>,
        calls: Family<CallLabels, Counter>,
        latency: Family<GuardLabels, Histogram, fn() -> Histogram>,
    }

    fn latency_histogram() -> Histogram {
        Histogram::new(exponential_buckets(0.001, 2.0, 14))
    }

    impl PrometheusSink {
        /// Creates the guard metrics and registers them with `registry`.
        pub fn register(registry: &mut Registry) -> Self {
            let sink = Self {
                transitions: Family::default(),
                refusals: Family::default(),
                trials: Family::default(),
                calls: Family::default(),
                latency: Family::new_with_constructor(latency_histogram as fn() -> Histogram),
            };

            registry.register(
                "guard_transitions",
                "Guard state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "guard_refusals",
                "Calls refused by an open guard",
                sink.refusals.clone(),
            );
            registry.register(
                "guard_trials",
                "Calls admitted as recovery trials",
                sink.trials.clone(),
            );
            registry.register(
                "guard_calls",
                "Guarded operations by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "guard_call_duration_seconds",
                "Latency of guarded operations",
                sink.latency.clone(),
            );

            sink
        }

        fn guard_labels(guard: &str) -> GuardLabels {
            GuardLabels {
                guard: guard.to_string(),
            }
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_transition(&self, guard: &str, from: GuardState, to: GuardState) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    guard: guard.to_string(),
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                })
                .inc();
        }

        fn record_refusal(&self, guard: &str) {
            self.refusals.get_or_create(&Self::guard_labels(guard)).inc();
        }

        fn record_trial(&self, guard: &str) {
            self.trials.get_or_create(&Self::guard_labels(guard)).inc();
        }

        fn record_call(&self, guard: &str, success: bool, duration: Duration) {
            let outcome = if success { "success" } else { "failure" };
            self.calls
                .get_or_create(&CallLabels {
                    guard: guard.to_string(),
                    outcome: outcome.to_string(),
                })
                .inc();
            self.latency
                .get_or_create(&Self::guard_labels(guard))
                .observe(duration.as_secs_f64());
        }
    }

}
