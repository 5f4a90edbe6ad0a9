//! Recompute worker: lock, delegate to the matrix job, release.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::config::NearbyConfigStore;
use super::lock::SingleFlightLock;
use super::matrix_job::{MatrixJob, MatrixJobOutcome};
use super::payload::ProviderErrorClass;
use crate::domain::ports::{
    EntityStore, RecomputeJob, RecomputeJobHandler, RecomputeJobStatus, RecomputeMetrics,
};
use crate::domain::{CacheSlot, EntityId, Error, TraceId};

/// Outcome of [`RecomputeWorker::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeRun {
    /// Another worker holds the lock; nothing was done.
    Skipped,
    /// Every batch was routed and stored.
    Completed {
        /// Items stored.
        items: usize,
    },
    /// The provider failed and the failure was recorded on the payload.
    ProviderFailed {
        /// Recorded class.
        class: ProviderErrorClass,
        /// Recorded backoff.
        retry_after_s: Option<u64>,
    },
}

impl RecomputeRun {
    /// Whether the worker got past lock acquisition.
    pub fn ran(&self) -> bool {
        !matches!(self, Self::Skipped)
    }

    fn status(&self) -> RecomputeJobStatus {
        match self {
            Self::Skipped => RecomputeJobStatus::Skipped,
            Self::Completed { .. } => RecomputeJobStatus::Completed,
            Self::ProviderFailed { .. } => RecomputeJobStatus::ProviderFailed,
        }
    }
}

/// Dependencies required by [`RecomputeWorker`].
pub struct RecomputeWorkerPorts {
    /// Entity lookup for the origin.
    pub store: Arc<dyn EntityStore>,
    /// Single-flight lock.
    pub lock: SingleFlightLock,
    /// Candidate routing and payload writes.
    pub job: MatrixJob,
    /// Live configuration.
    pub config: Arc<NearbyConfigStore>,
    /// Outcome counters.
    pub metrics: Arc<dyn RecomputeMetrics>,
}

/// Runs recomputes inline or on behalf of a queue backend.
pub struct RecomputeWorker {
    store: Arc<dyn EntityStore>,
    lock: SingleFlightLock,
    job: MatrixJob,
    config: Arc<NearbyConfigStore>,
    metrics: Arc<dyn RecomputeMetrics>,
}

impl RecomputeWorker {
    /// Build a worker.
    pub fn new(ports: RecomputeWorkerPorts) -> Self {
        Self {
            store: ports.store,
            lock: ports.lock,
            job: ports.job,
            config: ports.config,
            metrics: ports.metrics,
        }
    }

    /// Recompute `slot` for `origin`.
    ///
    /// Missing origins and slots the origin does not keep are input errors.
    /// Provider failures are recorded on the payload and returned as
    /// [`RecomputeRun::ProviderFailed`], never as errors.
    pub async fn run(&self, origin: EntityId, slot: CacheSlot) -> Result<RecomputeRun, Error> {
        let result = self.run_inner(origin, slot).await;
        let status = match &result {
            Ok(run) => run.status(),
            Err(_) => RecomputeJobStatus::Errored,
        };
        let _ = self.metrics.record(status).await;
        result
    }

    async fn run_inner(&self, origin: EntityId, slot: CacheSlot) -> Result<RecomputeRun, Error> {
        let entity = self
            .store
            .find_entity(origin)
            .await?
            .ok_or_else(|| Error::not_found(format!("entity {origin} not found")))?;
        if !entity.kind.lists(slot.target_kind()) {
            return Err(Error::invalid_request(format!(
                "{} entities do not keep a {slot} list",
                entity.kind
            )));
        }

        let config = self.config.snapshot();
        let outcome = self
            .lock
            .run_exclusive(origin, slot, || self.job.run(&entity, slot, &config))
            .await?;

        Ok(match outcome {
            None => RecomputeRun::Skipped,
            Some(result) => match result? {
                MatrixJobOutcome::Completed { items } => RecomputeRun::Completed { items },
                MatrixJobOutcome::ProviderFailed {
                    class,
                    retry_after_s,
                } => RecomputeRun::ProviderFailed {
                    class,
                    retry_after_s,
                },
            },
        })
    }
}

#[async_trait]
impl RecomputeJobHandler for RecomputeWorker {
    async fn handle(&self, job: RecomputeJob) {
        TraceId::scope_optional(job.trace_id, async {
            let key = job.key();
            match self.run(job.origin, job.slot).await {
                Ok(run) => info!(%key, outcome = ?run, "recompute job finished"),
                Err(error) => warn!(%key, code = ?error.code(), %error, "recompute job failed"),
            }
        })
        .await;
    }
}
