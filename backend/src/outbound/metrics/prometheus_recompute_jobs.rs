//! Prometheus adapter for nearby recompute outcome counters.

use async_trait::async_trait;
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::ports::{RecomputeJobStatus, RecomputeMetrics, RecomputeMetricsError};

/// Prometheus-backed recorder for recompute job outcomes.
///
/// # Metric Specification
///
/// - **Name**: `nearby_recompute_jobs_total`
/// - **Type**: Counter
/// - **Labels**:
///   - `status`: `completed`, `provider_failed`, `skipped`, or `errored`
pub struct PrometheusRecomputeJobMetrics {
    jobs_total: CounterVec,
}

impl PrometheusRecomputeJobMetrics {
    /// Create and register the counter with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration, for
    /// example when the name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let jobs_total = CounterVec::new(
            Opts::new(
                "nearby_recompute_jobs_total",
                "Total nearby recompute runs by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;
        Ok(Self { jobs_total })
    }
}

#[async_trait]
impl RecomputeMetrics for PrometheusRecomputeJobMetrics {
    async fn record(&self, status: RecomputeJobStatus) -> Result<(), RecomputeMetricsError> {
        self.jobs_total
            .with_label_values(&[status.as_label()])
            .inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for recompute job counters.

    use super::*;
    use rstest::rstest;

    fn make_metrics() -> (Registry, PrometheusRecomputeJobMetrics) {
        let registry = Registry::new();
        let metrics = PrometheusRecomputeJobMetrics::new(&registry)
            .expect("metric registration should succeed");
        (registry, metrics)
    }

    #[test]
    fn registers_counter_with_registry() {
        let (registry, metrics) = make_metrics();
        metrics.jobs_total.with_label_values(&["completed"]).inc();

        assert!(
            registry
                .gather()
                .iter()
                .any(|family| family.name() == "nearby_recompute_jobs_total"),
            "nearby_recompute_jobs_total should be registered"
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (registry, _metrics) = make_metrics();
        assert!(PrometheusRecomputeJobMetrics::new(&registry).is_err());
    }

    #[rstest]
    #[case::completed(RecomputeJobStatus::Completed)]
    #[case::provider_failed(RecomputeJobStatus::ProviderFailed)]
    #[case::skipped(RecomputeJobStatus::Skipped)]
    #[case::errored(RecomputeJobStatus::Errored)]
    #[tokio::test]
    async fn records_status_label(#[case] status: RecomputeJobStatus) {
        let (_registry, metrics) = make_metrics();

        metrics.record(status).await.expect("recording should not fail");
        metrics.record(status).await.expect("recording should not fail");

        let counter = metrics.jobs_total.with_label_values(&[status.as_label()]);
        assert_eq!(counter.get() as u64, 2, "{} should count twice", status.as_label());
    }
}
