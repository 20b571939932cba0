use std::borrow::Cow;

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Unit,
};
use tokio::time::Instant;

use crate::{metrics, Error};

#[derive(Clone)]
pub(crate) struct ControllerMetrics {
    runs: Counter,
    failures: Family<ErrorLabels, Counter>,
    duration: Histogram,
}

impl ControllerMetrics {
    /// Register reconcile metrics to start tracking them.
    pub fn new(controller_name: &str) -> Self {
        let mut guard = metrics::REGISTRY.write().unwrap();
        let registry = guard.sub_registry_with_label((
            Cow::Borrowed("controller_name"),
            Cow::Owned(controller_name.into()),
        ));
        let runs = Counter::default();
        let failures = Family::<ErrorLabels, Counter>::default();
        let duration = Histogram::new([0.01, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0, 60.0].into_iter());

        registry.register_with_unit(
            "reconcile_duration",
            "reconcile duration",
            Unit::Seconds,
            duration.clone(),
        );
        registry.register(
            "reconcile_failures",
            "Number of reconciliation errors",
            failures.clone(),
        );
        registry.register("reconcile_runs", "Number of reconciliations", runs.clone());
        Self {
            runs,
            failures,
            duration,
        }
    }

    pub fn count_failure(&self, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                error: e.metric_label().to_string(),
            })
            .inc();
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.runs.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

pub(crate) struct ReconcileMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub(crate) struct ErrorLabels {
    pub error: String,
}
