//! Domain port describing dispatch of nearby recompute jobs.
//!
//! Backends are interchangeable: the dispatcher walks them in the order chosen
//! at startup and never branches on which one it is talking to.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::define_port_error;
use crate::domain::{CacheSlot, EntityId, TraceId};

define_port_error! {
    /// Errors surfaced by a queue backend.
    pub enum JobDispatchError {
        /// Backend cannot accept work in the current runtime.
        Unavailable { message: String } => "recompute queue is unavailable: {message}",
        /// Backend refused this job.
        Rejected { message: String } => "recompute job was rejected: {message}",
    }
}

/// Scheduling priority of a recompute job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    /// Operator or read-triggered refresh.
    High,
    /// Change propagation.
    Normal,
}

impl JobPriority {
    fn rank(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Normal => 0,
        }
    }
}

impl Ord for JobPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for JobPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deduplication key: one pending job per origin and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    /// Origin entity.
    pub origin: EntityId,
    /// Cached list direction.
    pub slot: CacheSlot,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.slot)
    }
}

/// Recompute request for one origin and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecomputeJob {
    /// Origin entity.
    pub origin: EntityId,
    /// Cached list direction.
    pub slot: CacheSlot,
    /// Scheduling priority.
    pub priority: JobPriority,
    /// Trace of the request that caused the job.
    pub trace_id: Option<TraceId>,
}

impl RecomputeJob {
    /// Build a job, capturing the trace identifier in scope.
    pub fn new(origin: EntityId, slot: CacheSlot, priority: JobPriority) -> Self {
        Self {
            origin,
            slot,
            priority,
            trace_id: TraceId::current(),
        }
    }

    /// Deduplication key.
    pub fn key(&self) -> JobKey {
        JobKey {
            origin: self.origin,
            slot: self.slot,
        }
    }
}

/// Result of a successful enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The job was accepted.
    Queued,
    /// A job with the same key is already waiting.
    AlreadyPending,
}

/// Asynchronous backend that eventually runs recompute jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecomputeQueue: Send + Sync {
    /// Backend label used in logs.
    fn name(&self) -> &'static str;

    /// Whether a job with `key` is waiting to run.
    async fn is_pending(&self, key: JobKey) -> bool;

    /// Enqueue `job` unless one with the same key is already waiting.
    async fn enqueue(&self, job: RecomputeJob) -> Result<EnqueueOutcome, JobDispatchError>;
}

/// Consumer invoked by queue backends when a job is due.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecomputeJobHandler: Send + Sync {
    /// Run one job. Failures are handled and logged by the implementation.
    async fn handle(&self, job: RecomputeJob);
}
