//! Backend entry-point: loads settings, wires the nearby cache and serves the
//! REST API with OpenAPI docs.

mod server;

use std::sync::Arc;

use actix_web::web;
use color_eyre::eyre::{Context, Result, eyre};
#[cfg(feature = "metrics")]
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use nearby_backend::inbound::http::health::HealthState;
use nearby_backend::outbound::persistence::{DbPool, PoolConfig};
use nearby_backend::outbound::routing::OpenRouteServiceMatrix;
use nearby_backend::settings::NearbySettings;
use server::{ServerConfig, create_server};

/// Build Prometheus middleware, logging and continuing without it on error.
#[cfg(feature = "metrics")]
fn initialize_metrics<F, E>(build: F) -> Option<PrometheusMetrics>
where
    F: FnOnce() -> Result<PrometheusMetrics, E>,
    E: std::fmt::Display,
{
    match build() {
        Ok(metrics) => Some(metrics),
        Err(error) => {
            warn!(%error, "Prometheus metrics disabled");
            None
        }
    }
}

async fn build_server_config(settings: &NearbySettings) -> Result<ServerConfig> {
    let endpoint = settings.provider_endpoint()?;
    let routing = OpenRouteServiceMatrix::new(endpoint, settings.provider_timeout())
        .wrap_err("failed to build routing provider client")?;

    let config = ServerConfig::new(
        settings.bind_addr()?,
        Arc::new(routing),
        settings.nearby_config(),
    )
    .with_workers(settings.workers())
    .with_fallback_delay(settings.fallback_delay())
    .with_lock_ttl(settings.lock_ttl());

    let config = match &settings.database_url {
        Some(url) => {
            let mut pool_config = PoolConfig::new(url.clone());
            if let Some(max) = settings.db_max_connections {
                pool_config = pool_config.with_max_size(max);
            }
            let pool = DbPool::new(pool_config)
                .await
                .wrap_err("failed to build database pool")?;
            config.with_db_pool(pool)
        }
        None => config,
    };

    #[cfg(feature = "metrics")]
    let config = config.with_metrics(initialize_metrics(|| {
        PrometheusMetricsBuilder::new("nearby")
            .endpoint("/metrics")
            .build()
    }));

    Ok(config)
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = NearbySettings::load_from_iter(std::env::args_os())
        .map_err(|err| eyre!("failed to load settings: {err}"))?;
    let config = build_server_config(&settings).await?;
    let bind_addr = config.bind_addr();

    let health_state = web::Data::new(HealthState::new());
    let running = create_server(health_state, config)
        .wrap_err_with(|| format!("failed to start server on {bind_addr}"))?;
    info!(%bind_addr, "nearby backend listening");

    let outcome = running.server.await;
    running.worker_pool.shutdown();
    outcome.wrap_err("server terminated with an error")
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    //! Tests for metrics bootstrap.

    use super::*;

    #[test]
    fn initialize_metrics_returns_none_on_error() {
        let metrics = initialize_metrics(|| -> std::result::Result<_, &str> { Err("boom") });
        assert!(metrics.is_none(), "expected metrics to be absent on error");
    }

    #[test]
    fn initialize_metrics_returns_metrics_on_success() {
        let metrics = initialize_metrics(|| {
            PrometheusMetricsBuilder::new("test")
                .endpoint("/metrics")
                .build()
        });
        assert!(metrics.is_some(), "expected metrics to be present on success");
    }
}
