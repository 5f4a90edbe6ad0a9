//! HTTP server configuration object and helpers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nearby_backend::domain::nearby::NearbyConfig;
use nearby_backend::domain::nearby::lock::DEFAULT_LOCK_TTL_S;
use nearby_backend::domain::ports::RoutingProvider;
use nearby_backend::outbound::persistence::DbPool;
use nearby_backend::outbound::queue::DEFAULT_FALLBACK_DELAY;

#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetrics;

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) routing: Arc<dyn RoutingProvider>,
    pub(crate) nearby: NearbyConfig,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) workers: usize,
    pub(crate) fallback_delay: Duration,
    pub(crate) lock_ttl: chrono::Duration,
    #[cfg(feature = "metrics")]
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

impl ServerConfig {
    /// Construct a configuration with an in-memory store and default queues.
    #[must_use]
    pub fn new(
        bind_addr: SocketAddr,
        routing: Arc<dyn RoutingProvider>,
        nearby: NearbyConfig,
    ) -> Self {
        Self {
            bind_addr,
            routing,
            nearby,
            db_pool: None,
            workers: 2,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            lock_ttl: chrono::Duration::seconds(DEFAULT_LOCK_TTL_S),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Attach a database connection pool; entities and cache payloads are
    /// then stored in PostgreSQL.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Set the number of in-process recompute workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the delay of the timer fallback queue.
    #[must_use]
    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Set the age after which a recompute lock is abandoned.
    #[must_use]
    pub fn with_lock_ttl(mut self, lock_ttl: chrono::Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[cfg(feature = "metrics")]
    /// Attach Prometheus middleware to the configuration.
    #[must_use]
    pub fn with_metrics(mut self, prometheus: Option<PrometheusMetrics>) -> Self {
        self.prometheus = prometheus;
        self
    }
}
