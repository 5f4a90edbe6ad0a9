//! Server construction and middleware wiring.

mod config;
#[cfg(feature = "metrics")]
mod metrics;
mod state_builders;

pub use config::ServerConfig;

#[cfg(feature = "metrics")]
use metrics::MetricsLayer;
use state_builders::build_nearby_runtime;

use std::sync::Arc;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use nearby_backend::Trace;
#[cfg(debug_assertions)]
use nearby_backend::doc::ApiDoc;
use nearby_backend::inbound::http::configure_api;
use nearby_backend::inbound::http::health::{HealthState, live, ready};
use nearby_backend::inbound::http::state::HttpState;
use nearby_backend::outbound::queue::WorkerPoolQueue;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
    } = deps;

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .service(web::scope("/api/v1").configure(configure_api))
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

/// A bound server plus the worker pool draining recompute jobs.
pub struct RunningServer {
    /// Spawned server; await it to drive the listener.
    pub server: Server,
    /// Stop this after the server exits so queued jobs are discarded.
    pub worker_pool: Arc<WorkerPoolQueue>,
}

/// Construct an Actix HTTP server using the provided health state and configuration.
///
/// # Parameters
/// - `health_state`: shared readiness state updated once the server is initialised.
/// - `config`: pre-built [`ServerConfig`] with the routing provider, storage and queue settings.
///
/// # Errors
/// Propagates [`std::io::Error`] when the recompute backends cannot start or
/// binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<RunningServer> {
    let server_health_state = health_state.clone();
    let runtime = build_nearby_runtime(&config)?;
    let http_state = runtime.http_state.clone();

    #[cfg(feature = "metrics")]
    let metrics_layer = MetricsLayer::from_option(config.prometheus);

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics_layer.clone());

        app
    })
    .bind(config.bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(RunningServer {
        server,
        worker_pool: runtime.worker_pool,
    })
}

#[cfg(test)]
mod tests {
    //! Tests for server bootstrap and readiness signalling.

    use super::*;
    use std::net::SocketAddr;

    use nearby_backend::domain::nearby::NearbyConfig;
    use nearby_backend::test_support::ScriptedRoutingProvider;
    use rstest::{fixture, rstest};

    #[fixture]
    fn health_state() -> web::Data<HealthState> {
        web::Data::new(HealthState::new())
    }

    #[fixture]
    fn server_config() -> ServerConfig {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid address");
        ServerConfig::new(
            addr,
            Arc::new(ScriptedRoutingProvider::new(1.4)),
            NearbyConfig::default(),
        )
    }

    #[rstest]
    fn config_reports_bind_address(server_config: ServerConfig) {
        assert_eq!(server_config.bind_addr().port(), 0);
    }

    #[rstest]
    #[actix_rt::test]
    async fn create_server_marks_ready(
        health_state: web::Data<HealthState>,
        server_config: ServerConfig,
    ) {
        assert!(!health_state.is_ready(), "state should start unready");

        let running = create_server(health_state.clone(), server_config)
            .expect("server should build");

        assert!(
            health_state.is_ready(),
            "server creation should mark readiness"
        );
        running.worker_pool.shutdown();
    }

    #[cfg(feature = "metrics")]
    #[rstest]
    #[actix_rt::test]
    async fn create_server_registers_recompute_metrics(
        health_state: web::Data<HealthState>,
        server_config: ServerConfig,
    ) {
        let prometheus = actix_web_prom::PrometheusMetricsBuilder::new("test")
            .endpoint("/metrics")
            .build()
            .expect("metrics should build for tests");
        let registry = prometheus.registry.clone();

        let running = create_server(health_state, server_config.with_metrics(Some(prometheus)))
            .expect("server should build with metrics");

        assert!(
            nearby_backend::outbound::metrics::PrometheusRecomputeJobMetrics::new(&registry)
                .is_err(),
            "recompute counter should already be registered"
        );
        running.worker_pool.shutdown();
    }
}
