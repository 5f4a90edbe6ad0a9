//! Delayed one-shot fallback backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::runtime::Handle;
use tracing::debug;

use crate::domain::ports::{
    EnqueueOutcome, JobDispatchError, JobKey, RecomputeJob, RecomputeJobHandler, RecomputeQueue,
};

/// Default delay before a fallback job runs.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(5);

/// Schedules each job as a sleeping tokio task.
///
/// No ordering between jobs is promised; priority only affects the pool.
pub struct TimerQueue {
    handler: Arc<dyn RecomputeJobHandler>,
    delay: Duration,
    jitter_ms: u64,
    scheduled: Arc<Mutex<HashSet<JobKey>>>,
}

impl TimerQueue {
    /// Build a timer backend with the default delay and no jitter.
    pub fn new(handler: Arc<dyn RecomputeJobHandler>) -> Self {
        Self {
            handler,
            delay: DEFAULT_FALLBACK_DELAY,
            jitter_ms: 0,
            scheduled: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Override the base delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Spread fallback jobs by up to `jitter_ms` extra milliseconds.
    #[must_use]
    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    fn scheduled(&self) -> MutexGuard<'_, HashSet<JobKey>> {
        lock(&self.scheduled)
    }

    fn delay_for_next(&self) -> Duration {
        if self.jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
    }
}

fn lock(set: &Mutex<HashSet<JobKey>>) -> MutexGuard<'_, HashSet<JobKey>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RecomputeQueue for TimerQueue {
    fn name(&self) -> &'static str {
        "timer"
    }

    async fn is_pending(&self, key: JobKey) -> bool {
        self.scheduled().contains(&key)
    }

    async fn enqueue(&self, job: RecomputeJob) -> Result<EnqueueOutcome, JobDispatchError> {
        let runtime = Handle::try_current()
            .map_err(|err| JobDispatchError::unavailable(err.to_string()))?;
        let key = job.key();
        if !self.scheduled().insert(key) {
            return Ok(EnqueueOutcome::AlreadyPending);
        }

        let delay = self.delay_for_next();
        let handler = Arc::clone(&self.handler);
        let scheduled = Arc::clone(&self.scheduled);
        debug!(%key, delay_ms = delay.as_millis() as u64, "scheduled fallback recompute");
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&scheduled).remove(&key);
            handler.handle(job).await;
        });
        Ok(EnqueueOutcome::Queued)
    }
}
