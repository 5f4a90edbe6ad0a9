//! Priority worker pool backend.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::ports::{
    EnqueueOutcome, JobDispatchError, JobKey, RecomputeJob, RecomputeJobHandler, RecomputeQueue,
};

#[derive(Debug)]
struct QueuedJob {
    job: RecomputeJob,
    sequence: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    // Max-heap: higher priority first, then lower sequence (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct PoolState {
    heap: BinaryHeap<QueuedJob>,
    pending: HashSet<JobKey>,
    next_sequence: u64,
}

struct Shared {
    state: Mutex<PoolState>,
    wake: Notify,
    closed: AtomicBool,
    handler: Arc<dyn RecomputeJobHandler>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next job and release its dedup key so a trigger arriving while
    /// it runs can queue a follow-up.
    fn next_job(&self) -> Option<RecomputeJob> {
        let mut state = self.state();
        let queued = state.heap.pop()?;
        state.pending.remove(&queued.job.key());
        Some(queued.job)
    }
}

/// Priority queue drained by `workers` tokio tasks.
pub struct WorkerPoolQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPoolQueue {
    /// Spawn `workers` tasks on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`JobDispatchError::Unavailable`] outside a tokio runtime.
    pub fn start(
        handler: Arc<dyn RecomputeJobHandler>,
        workers: usize,
    ) -> Result<Self, JobDispatchError> {
        let runtime = Handle::try_current()
            .map_err(|err| JobDispatchError::unavailable(err.to_string()))?;
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            handler,
        });
        let handles = (0..workers.max(1))
            .map(|index| runtime.spawn(run_worker(Arc::clone(&shared), index)))
            .collect();
        info!(workers = workers.max(1), "recompute worker pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(handles),
        })
    }

    /// Stop accepting jobs and abort the worker tasks. Waiting jobs are
    /// discarded.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, AtomicOrdering::SeqCst);
        let handles =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            handle.abort();
        }
        let mut state = self.shared.state();
        state.heap.clear();
        state.pending.clear();
        info!("recompute worker pool stopped");
    }

    /// Number of jobs waiting to run.
    pub fn queued(&self) -> usize {
        self.shared.state().heap.len()
    }
}

impl Drop for WorkerPoolQueue {
    fn drop(&mut self) {
        for handle in self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            handle.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, index: usize) {
    loop {
        match shared.next_job() {
            Some(job) => {
                debug!(worker = index, key = %job.key(), "worker picked recompute job");
                shared.handler.handle(job).await;
            }
            None => shared.wake.notified().await,
        }
    }
}

#[async_trait]
impl RecomputeQueue for WorkerPoolQueue {
    fn name(&self) -> &'static str {
        "worker_pool"
    }

    async fn is_pending(&self, key: JobKey) -> bool {
        self.shared.state().pending.contains(&key)
    }

    async fn enqueue(&self, job: RecomputeJob) -> Result<EnqueueOutcome, JobDispatchError> {
        if self.shared.closed.load(AtomicOrdering::SeqCst) {
            return Err(JobDispatchError::unavailable("worker pool is shut down"));
        }
        {
            let mut state = self.shared.state();
            if !state.pending.insert(job.key()) {
                return Ok(EnqueueOutcome::AlreadyPending);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.heap.push(QueuedJob { job, sequence });
        }
        self.shared.wake.notify_one();
        Ok(EnqueueOutcome::Queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::JobPriority;
    use crate::domain::{CacheSlot, EntityId};
    use rstest::rstest;
    use tokio::sync::{Semaphore, mpsc};

    /// Handler that blocks until a permit is available and reports each job.
    struct GatedHandler {
        gate: Semaphore,
        seen: mpsc::UnboundedSender<RecomputeJob>,
    }

    #[async_trait]
    impl RecomputeJobHandler for GatedHandler {
        async fn handle(&self, job: RecomputeJob) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            let _ = self.seen.send(job);
        }
    }

    fn job(origin: i64, priority: JobPriority) -> RecomputeJob {
        RecomputeJob::new(
            EntityId::new(origin).expect("positive id"),
            CacheSlot::NearbyPois,
            priority,
        )
    }

    fn gated() -> (Arc<GatedHandler>, mpsc::UnboundedReceiver<RecomputeJob>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (
            Arc::new(GatedHandler {
                gate: Semaphore::new(0),
                seen,
            }),
            rx,
        )
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_keys_are_pending_once() {
        let (handler, _rx) = gated();
        let pool = WorkerPoolQueue::start(handler, 1).expect("runtime present");

        // The single worker picks the first job and parks on the gate.
        pool.enqueue(job(1, JobPriority::Normal)).await.expect("enqueue");
        tokio::task::yield_now().await;

        assert_eq!(
            pool.enqueue(job(2, JobPriority::Normal)).await.expect("enqueue"),
            EnqueueOutcome::Queued
        );
        assert_eq!(
            pool.enqueue(job(2, JobPriority::High)).await.expect("enqueue"),
            EnqueueOutcome::AlreadyPending
        );
        assert!(pool.is_pending(job(2, JobPriority::Normal).key()).await);
    }

    #[rstest]
    #[tokio::test]
    async fn high_priority_runs_before_older_normal_jobs() {
        let (handler, mut rx) = gated();
        let pool = WorkerPoolQueue::start(handler.clone(), 1).expect("runtime present");

        pool.enqueue(job(1, JobPriority::Normal)).await.expect("enqueue");
        tokio::task::yield_now().await;
        pool.enqueue(job(2, JobPriority::Normal)).await.expect("enqueue");
        pool.enqueue(job(3, JobPriority::Normal)).await.expect("enqueue");
        pool.enqueue(job(4, JobPriority::High)).await.expect("enqueue");

        handler.gate.add_permits(4);
        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(rx.recv().await.expect("job handled").origin.get());
        }
        assert_eq!(order, vec![1, 4, 2, 3]);
    }

    #[rstest]
    #[tokio::test]
    async fn shut_down_pool_is_unavailable() {
        let (handler, _rx) = gated();
        let pool = WorkerPoolQueue::start(handler, 2).expect("runtime present");
        pool.shutdown();

        let err = pool
            .enqueue(job(1, JobPriority::High))
            .await
            .expect_err("closed pool");
        assert!(matches!(err, JobDispatchError::Unavailable { .. }));
    }

    #[rstest]
    fn start_requires_a_runtime() {
        let (handler, _rx) = gated();
        assert!(WorkerPoolQueue::start(handler, 1).is_err());
    }
}
