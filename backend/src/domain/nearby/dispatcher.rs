//! Recompute dispatch across an ordered chain of queue backends.
//!
//! The first backend is the preferred one; later backends are fallbacks used
//! only when an earlier one is unavailable or rejects the job. Dispatch never
//! fails from the caller's point of view: when every backend refuses, the job
//! is dropped and logged, and the next stale read will try again.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::ports::{EnqueueOutcome, RecomputeJob, RecomputeQueue};

/// What happened to a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the named backend.
    Queued {
        /// Backend label.
        backend: &'static str,
    },
    /// A job with the same key was already waiting.
    AlreadyPending,
    /// No backend accepted the job.
    Dropped,
}

/// Dispatcher over queue backends in preference order.
#[derive(Clone)]
pub struct RecomputeDispatcher {
    backends: Vec<Arc<dyn RecomputeQueue>>,
}

impl RecomputeDispatcher {
    /// Build a dispatcher trying `backends` in order.
    pub fn new(backends: Vec<Arc<dyn RecomputeQueue>>) -> Self {
        Self { backends }
    }

    /// Enqueue `job` on the first backend that accepts it.
    pub async fn enqueue(&self, job: RecomputeJob) -> DispatchOutcome {
        let key = job.key();
        for backend in &self.backends {
            if backend.is_pending(key).await {
                debug!(%key, backend = backend.name(), "recompute already pending");
                return DispatchOutcome::AlreadyPending;
            }
        }

        for backend in &self.backends {
            match backend.enqueue(job).await {
                Ok(EnqueueOutcome::Queued) => {
                    debug!(%key, backend = backend.name(), priority = ?job.priority, "recompute queued");
                    return DispatchOutcome::Queued {
                        backend: backend.name(),
                    };
                }
                Ok(EnqueueOutcome::AlreadyPending) => return DispatchOutcome::AlreadyPending,
                Err(error) => {
                    info!(%key, backend = backend.name(), %error, "queue backend refused job; falling back");
                }
            }
        }

        warn!(%key, "no queue backend accepted recompute job");
        DispatchOutcome::Dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{JobDispatchError, JobPriority, MockRecomputeQueue};
    use crate::domain::{CacheSlot, EntityId};
    use rstest::{fixture, rstest};

    #[fixture]
    fn job() -> RecomputeJob {
        RecomputeJob::new(
            EntityId::new(40).expect("positive id"),
            CacheSlot::NearbyChargers,
            JobPriority::High,
        )
    }

    fn backend(name: &'static str) -> MockRecomputeQueue {
        let mut queue = MockRecomputeQueue::new();
        queue.expect_name().return_const(name);
        queue
    }

    #[rstest]
    #[tokio::test]
    async fn pending_job_is_not_enqueued_again(job: RecomputeJob) {
        let mut preferred = backend("pool");
        preferred.expect_is_pending().return_const(true);
        preferred.expect_enqueue().never();

        let dispatcher = RecomputeDispatcher::new(vec![Arc::new(preferred)]);
        assert_eq!(dispatcher.enqueue(job).await, DispatchOutcome::AlreadyPending);
    }

    #[rstest]
    #[tokio::test]
    async fn preferred_backend_wins_when_available(job: RecomputeJob) {
        let mut preferred = backend("pool");
        preferred.expect_is_pending().return_const(false);
        preferred
            .expect_enqueue()
            .times(1)
            .returning(|_| Ok(EnqueueOutcome::Queued));
        let mut fallback = backend("timer");
        fallback.expect_is_pending().return_const(false);
        fallback.expect_enqueue().never();

        let dispatcher = RecomputeDispatcher::new(vec![Arc::new(preferred), Arc::new(fallback)]);
        assert_eq!(
            dispatcher.enqueue(job).await,
            DispatchOutcome::Queued { backend: "pool" }
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unavailable_backend_falls_back(job: RecomputeJob) {
        let mut preferred = backend("pool");
        preferred.expect_is_pending().return_const(false);
        preferred
            .expect_enqueue()
            .returning(|_| Err(JobDispatchError::unavailable("shut down")));
        let mut fallback = backend("timer");
        fallback.expect_is_pending().return_const(false);
        fallback
            .expect_enqueue()
            .withf(|queued| queued.priority == JobPriority::High)
            .returning(|_| Ok(EnqueueOutcome::Queued));

        let dispatcher = RecomputeDispatcher::new(vec![Arc::new(preferred), Arc::new(fallback)]);
        assert_eq!(
            dispatcher.enqueue(job).await,
            DispatchOutcome::Queued { backend: "timer" }
        );
    }

    #[rstest]
    #[tokio::test]
    async fn every_backend_refusing_drops_silently(job: RecomputeJob) {
        let mut only = backend("timer");
        only.expect_is_pending().return_const(false);
        only.expect_enqueue()
            .returning(|_| Err(JobDispatchError::rejected("no runtime")));

        let dispatcher = RecomputeDispatcher::new(vec![Arc::new(only)]);
        assert_eq!(dispatcher.enqueue(job).await, DispatchOutcome::Dropped);
    }

    #[rstest]
    #[tokio::test]
    async fn pending_in_fallback_counts_as_pending(job: RecomputeJob) {
        let mut preferred = backend("pool");
        preferred.expect_is_pending().return_const(false);
        preferred.expect_enqueue().never();
        let mut fallback = backend("timer");
        fallback.expect_is_pending().return_const(true);

        let dispatcher = RecomputeDispatcher::new(vec![Arc::new(preferred), Arc::new(fallback)]);
        assert_eq!(dispatcher.enqueue(job).await, DispatchOutcome::AlreadyPending);
    }
}
