//! In-process queue backends for nearby recompute jobs.
//!
//! - [`WorkerPoolQueue`]: priority queue drained by a fixed set of tokio
//!   worker tasks. Preferred backend.
//! - [`TimerQueue`]: one-shot delayed callback per job. Fallback when the pool
//!   is shut down or refuses work.
//!
//! Both deduplicate by `(origin, slot)` and hand due jobs to a
//! [`RecomputeJobHandler`](crate::domain::ports::RecomputeJobHandler).

mod timer;
mod worker_pool;

pub use timer::{DEFAULT_FALLBACK_DELAY, TimerQueue};
pub use worker_pool::WorkerPoolQueue;
