//! Proximity cache and recompute orchestration.
//!
//! Control flow: entity mutation → [`propagator`] → [`dispatcher`] →
//! queue backend → [`worker`] → [`matrix_job`] → [`cache_store`]. Reads go
//! through [`service`], which consults [`policy`] and may start the same
//! chain, falling back to [`geo`] estimates while nothing is cached.

pub mod cache_store;
pub mod config;
pub mod dispatcher;
pub mod geo;
pub mod lock;
pub mod matrix_job;
pub mod payload;
pub mod policy;
pub mod propagator;
pub mod service;
pub mod worker;

use std::sync::Arc;

use mockable::Clock;

pub use self::cache_store::CacheStore;
pub use self::config::{ConfigUpdateError, NearbyConfig, NearbyConfigStore, NearbyConfigUpdate};
pub use self::dispatcher::{DispatchOutcome, RecomputeDispatcher};
pub use self::lock::SingleFlightLock;
pub use self::matrix_job::{CandidateSelector, MatrixJob, MatrixJobOutcome};
pub use self::payload::{CachePayload, NearbyItem, Progress, ProviderErrorClass};
pub use self::policy::{RefreshDecision, should_refresh_now};
pub use self::propagator::{InvalidationPropagator, PropagationReport};
pub use self::service::{
    EnrichedItem, NearbyQuery, NearbyService, NearbyServicePorts, NearbyView, ProviderCheck,
    RecomputeReport,
};
pub use self::worker::{RecomputeRun, RecomputeWorker, RecomputeWorkerPorts};

use crate::domain::EntityService;
use crate::domain::ports::{EntityStore, RecomputeMetrics, RoutingProvider};

/// Shared dependencies of every nearby component.
///
/// Queue backends need the worker before the dispatcher exists, so wiring
/// happens in two steps: build the [`worker`](Self::worker), start the
/// backends with it, then call [`services`](Self::services).
#[derive(Clone)]
pub struct NearbyWiring {
    /// Entity and attribute storage.
    pub store: Arc<dyn EntityStore>,
    /// Routing provider.
    pub routing: Arc<dyn RoutingProvider>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Recompute outcome counters.
    pub metrics: Arc<dyn RecomputeMetrics>,
    /// Live configuration.
    pub config: Arc<NearbyConfigStore>,
    /// Age after which a recompute lock is abandoned.
    pub lock_ttl: chrono::Duration,
}

/// Façades exposed to inbound adapters.
#[derive(Clone)]
pub struct NearbyServices {
    /// Read and operator commands.
    pub nearby: Arc<NearbyService>,
    /// Entity mutations with invalidation.
    pub entities: Arc<EntityService>,
}

impl NearbyWiring {
    /// Lock shared by the worker and the read path.
    pub fn lock(&self) -> SingleFlightLock {
        SingleFlightLock::new(self.store.clone(), self.clock.clone(), self.lock_ttl)
    }

    /// Recompute worker, also the handler queue backends call.
    pub fn worker(&self) -> Arc<RecomputeWorker> {
        let cache = CacheStore::new(self.store.clone());
        let job = MatrixJob::new(
            CandidateSelector::new(self.store.clone()),
            self.routing.clone(),
            cache,
            self.clock.clone(),
        );
        Arc::new(RecomputeWorker::new(RecomputeWorkerPorts {
            store: self.store.clone(),
            lock: self.lock(),
            job,
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }))
    }

    /// Assemble the façades around `worker` and `dispatcher`.
    pub fn services(
        &self,
        worker: Arc<RecomputeWorker>,
        dispatcher: Arc<RecomputeDispatcher>,
    ) -> NearbyServices {
        let propagator = InvalidationPropagator::new(
            self.store.clone(),
            CacheStore::new(self.store.clone()),
            dispatcher.clone(),
            self.config.clone(),
        );
        let nearby = NearbyService::new(NearbyServicePorts {
            store: self.store.clone(),
            routing: self.routing.clone(),
            dispatcher,
            worker,
            lock: self.lock(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        });
        NearbyServices {
            nearby: Arc::new(nearby),
            entities: Arc::new(EntityService::new(self.store.clone(), Arc::new(propagator))),
        }
    }
}
