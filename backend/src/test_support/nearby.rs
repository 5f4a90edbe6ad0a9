//! Shared doubles for nearby-cache tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use serde_json::Map;

use crate::domain::nearby::geo::haversine_m;
use crate::domain::nearby::lock::DEFAULT_LOCK_TTL_S;
use crate::domain::nearby::{
    NearbyConfig, NearbyConfigStore, NearbyServices, NearbyWiring, RecomputeDispatcher,
    RecomputeWorker,
};
use crate::domain::ports::{
    ApiKey, EnqueueOutcome, JobDispatchError, JobKey, MatrixCell, MatrixRequest, MatrixResponse,
    NoOpRecomputeMetrics, RecomputeJob, RecomputeQueue, RoutingProvider, RoutingProviderError,
};
use crate::domain::{Coordinates, Entity, EntityId, EntityKind};
use crate::outbound::memory::InMemoryEntityStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("test double mutex poisoned"),
    }
}

/// Build an entity with a generated title and empty metadata.
pub fn sample_entity(id: i64, kind: EntityKind, lat: f64, lng: f64) -> Entity {
    Entity {
        id: EntityId::new(id).unwrap_or_else(|err| panic!("sample id: {err}")),
        kind,
        coordinates: Coordinates::new(lat, lng).unwrap_or_else(|err| panic!("sample coordinates: {err}")),
        title: format!("{kind} {id}"),
        metadata: Map::new(),
    }
}

/// Clock whose time only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: TimeDelta) {
        *lock(&self.0) += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(TimeDelta::seconds(seconds));
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.0) = now;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.0)
    }
}

/// Routing provider answering with haversine distance and a fixed speed,
/// unless a scripted failure is queued for the next call.
pub struct ScriptedRoutingProvider {
    speed_mps: f64,
    failures: Mutex<VecDeque<Option<RoutingProviderError>>>,
    requests: Mutex<Vec<MatrixRequest>>,
}

impl Default for ScriptedRoutingProvider {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ScriptedRoutingProvider {
    pub const NAME: &'static str = "scripted";

    pub fn new(speed_mps: f64) -> Self {
        Self {
            speed_mps,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Let the next call succeed; use before [`Self::fail_next`] to fail a
    /// later batch.
    pub fn succeed_next(&self) {
        lock(&self.failures).push_back(None);
    }

    /// Fail the next unscripted call with `error`.
    pub fn fail_next(&self, error: RoutingProviderError) {
        lock(&self.failures).push_back(Some(error));
    }

    pub fn requests(&self) -> Vec<MatrixRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl RoutingProvider for ScriptedRoutingProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn matrix(&self, request: &MatrixRequest) -> Result<MatrixResponse, RoutingProviderError> {
        lock(&self.requests).push(request.clone());
        if let Some(Some(error)) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        let cells = request
            .destinations
            .iter()
            .map(|destination| {
                let distance = haversine_m(request.origin, *destination);
                MatrixCell {
                    distance_m: Some(distance),
                    duration_s: Some(distance / self.speed_mps),
                }
            })
            .collect();
        Ok(MatrixResponse { cells })
    }
}

/// Queue that records jobs and deduplicates like a real backend.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<RecomputeJob>>,
    pending: Mutex<HashSet<JobKey>>,
    unavailable: Mutex<bool>,
}

impl RecordingQueue {
    pub fn unavailable() -> Self {
        let queue = Self::default();
        *lock(&queue.unavailable) = true;
        queue
    }

    pub fn jobs(&self) -> Vec<RecomputeJob> {
        lock(&self.jobs).clone()
    }

    pub fn keys(&self) -> Vec<JobKey> {
        self.jobs().iter().map(RecomputeJob::key).collect()
    }

    /// Forget pending keys as if a worker had picked every job up.
    pub fn drain(&self) -> Vec<RecomputeJob> {
        lock(&self.pending).clear();
        std::mem::take(&mut *lock(&self.jobs))
    }
}

#[async_trait]
impl RecomputeQueue for RecordingQueue {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn is_pending(&self, key: JobKey) -> bool {
        lock(&self.pending).contains(&key)
    }

    async fn enqueue(&self, job: RecomputeJob) -> Result<EnqueueOutcome, JobDispatchError> {
        if *lock(&self.unavailable) {
            return Err(JobDispatchError::unavailable("recording queue disabled"));
        }
        if !lock(&self.pending).insert(job.key()) {
            return Ok(EnqueueOutcome::AlreadyPending);
        }
        lock(&self.jobs).push(job);
        Ok(EnqueueOutcome::Queued)
    }
}

/// In-memory nearby stack with every double exposed for assertions.
///
/// Jobs land in a [`RecordingQueue`] and only run when a test calls
/// [`NearbyHarness::run_queued`].
#[derive(Clone)]
pub struct NearbyHarness {
    pub store: Arc<InMemoryEntityStore>,
    pub routing: Arc<ScriptedRoutingProvider>,
    pub clock: Arc<MutableClock>,
    pub queue: Arc<RecordingQueue>,
    pub config: Arc<NearbyConfigStore>,
    pub services: NearbyServices,
    worker: Arc<RecomputeWorker>,
}

impl NearbyHarness {
    /// Harness seeded with `entities` and a configured provider key.
    pub fn new(entities: impl IntoIterator<Item = Entity>, now: DateTime<Utc>) -> Self {
        Self::with_queue(entities, now, RecordingQueue::default())
    }

    /// Harness whose dispatcher only knows `queue`.
    pub fn with_queue(
        entities: impl IntoIterator<Item = Entity>,
        now: DateTime<Utc>,
        queue: RecordingQueue,
    ) -> Self {
        let store = Arc::new(InMemoryEntityStore::with_entities(entities));
        let routing = Arc::new(ScriptedRoutingProvider::new(1.4));
        let clock = Arc::new(MutableClock::new(now));
        let queue = Arc::new(queue);
        let config = Arc::new(NearbyConfigStore::new(NearbyConfig {
            api_key: ApiKey::new("test-key"),
            ..NearbyConfig::default()
        }));
        let wiring = NearbyWiring {
            store: store.clone(),
            routing: routing.clone(),
            clock: clock.clone(),
            metrics: Arc::new(NoOpRecomputeMetrics),
            config: config.clone(),
            lock_ttl: TimeDelta::seconds(DEFAULT_LOCK_TTL_S),
        };
        let worker = wiring.worker();
        let backends: Vec<Arc<dyn RecomputeQueue>> = vec![queue.clone()];
        let services = wiring.services(worker.clone(), Arc::new(RecomputeDispatcher::new(backends)));
        Self {
            store,
            routing,
            clock,
            queue,
            config,
            services,
            worker,
        }
    }

    /// Run every recorded job inline, as a worker would.
    pub async fn run_queued(&self) -> usize {
        let jobs = self.queue.drain();
        for job in &jobs {
            if let Err(error) = self.worker.run(job.origin, job.slot).await {
                panic!("queued recompute for {} failed: {error}", job.key());
            }
        }
        jobs.len()
    }
}
