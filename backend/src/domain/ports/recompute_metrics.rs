//! Domain port surface for recompute job outcome counters.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording recompute metrics.
    pub enum RecomputeMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } => "recompute metrics exporter failed: {message}",
    }
}

/// Outcome label of one recompute run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RecomputeJobStatus {
    /// Every batch succeeded.
    Completed,
    /// The provider failed and the error was recorded on the payload.
    ProviderFailed,
    /// Another worker held the lock.
    Skipped,
    /// The job could not run (missing origin, store failure).
    Errored,
}

impl RecomputeJobStatus {
    /// Metric label value.
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ProviderFailed => "provider_failed",
            Self::Skipped => "skipped",
            Self::Errored => "errored",
        }
    }
}

/// Metrics recording port for recompute outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecomputeMetrics: Send + Sync {
    /// Count one recompute run.
    async fn record(&self, status: RecomputeJobStatus) -> Result<(), RecomputeMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecomputeMetrics;

#[async_trait]
impl RecomputeMetrics for NoOpRecomputeMetrics {
    async fn record(&self, _status: RecomputeJobStatus) -> Result<(), RecomputeMetricsError> {
        Ok(())
    }
}
