//! Builders for the entity store, recompute backends and HTTP state.

use std::sync::Arc;

use actix_web::web;
use mockable::DefaultClock;
use tracing::info;

use nearby_backend::domain::nearby::{NearbyConfigStore, NearbyWiring, RecomputeDispatcher};
use nearby_backend::domain::ports::{
    EntityStore, NoOpRecomputeMetrics, RecomputeJobHandler, RecomputeMetrics, RecomputeQueue,
};
use nearby_backend::inbound::http::state::HttpState;
use nearby_backend::outbound::memory::InMemoryEntityStore;
use nearby_backend::outbound::persistence::DieselEntityStore;
#[cfg(feature = "metrics")]
use nearby_backend::outbound::metrics::PrometheusRecomputeJobMetrics;
use nearby_backend::outbound::queue::{TimerQueue, WorkerPoolQueue};

use super::ServerConfig;

/// Running recompute machinery that must outlive the HTTP server.
pub(crate) struct NearbyRuntime {
    pub(crate) http_state: web::Data<HttpState>,
    pub(crate) worker_pool: Arc<WorkerPoolQueue>,
}

/// Select PostgreSQL when a pool is configured, otherwise the in-memory store.
fn build_store(config: &ServerConfig) -> Arc<dyn EntityStore> {
    match &config.db_pool {
        Some(pool) => Arc::new(DieselEntityStore::new(pool.clone())),
        None => {
            info!("no database configured; entities are kept in memory");
            Arc::new(InMemoryEntityStore::default())
        }
    }
}

/// Register recompute counters on the Prometheus registry when one is
/// configured.
///
/// # Errors
/// Returns [`std::io::Error`] if metric registration fails.
#[cfg(feature = "metrics")]
fn build_recompute_metrics(config: &ServerConfig) -> std::io::Result<Arc<dyn RecomputeMetrics>> {
    match &config.prometheus {
        Some(prom) => {
            let metrics = PrometheusRecomputeJobMetrics::new(&prom.registry).map_err(|e| {
                std::io::Error::other(format!("recompute metrics registration failed: {e}"))
            })?;
            Ok(Arc::new(metrics))
        }
        None => Ok(Arc::new(NoOpRecomputeMetrics)),
    }
}

#[cfg(not(feature = "metrics"))]
fn build_recompute_metrics(_config: &ServerConfig) -> std::io::Result<Arc<dyn RecomputeMetrics>> {
    Ok(Arc::new(NoOpRecomputeMetrics))
}

/// Wire the nearby services and start the queue backends.
///
/// The worker pool is preferred; the timer queue takes over once the pool
/// has shut down.
///
/// # Errors
/// Returns [`std::io::Error`] outside a tokio runtime or when metrics cannot
/// be registered.
pub(crate) fn build_nearby_runtime(config: &ServerConfig) -> std::io::Result<NearbyRuntime> {
    let wiring = NearbyWiring {
        store: build_store(config),
        routing: config.routing.clone(),
        clock: Arc::new(DefaultClock),
        metrics: build_recompute_metrics(config)?,
        config: Arc::new(NearbyConfigStore::new(config.nearby.clone())),
        lock_ttl: config.lock_ttl,
    };

    let worker = wiring.worker();
    let handler: Arc<dyn RecomputeJobHandler> = worker.clone();
    let worker_pool = Arc::new(
        WorkerPoolQueue::start(handler.clone(), config.workers)
            .map_err(|e| std::io::Error::other(format!("worker pool failed to start: {e}")))?,
    );
    let timer = TimerQueue::new(handler).with_delay(config.fallback_delay);
    let backends: Vec<Arc<dyn RecomputeQueue>> = vec![worker_pool.clone(), Arc::new(timer)];
    let dispatcher = Arc::new(RecomputeDispatcher::new(backends));

    let services = wiring.services(worker, dispatcher);
    Ok(NearbyRuntime {
        http_state: web::Data::new(HttpState::new(services)),
        worker_pool,
    })
}
