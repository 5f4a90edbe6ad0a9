//! OpenAPI documentation configuration.
//!
//! This module defines the [`ApiDoc`] struct which generates the OpenAPI
//! specification for the REST API. It registers:
//!
//! - **Paths**: every HTTP endpoint of the inbound layer (nearby, entities,
//!   admin, health)
//! - **Schemas**: domain type wrappers ([`ErrorSchema`], [`ErrorCodeSchema`],
//!   [`EntityKindSchema`], [`CoordinatesSchema`]) that provide OpenAPI
//!   definitions without coupling domain types to the utoipa framework
//!
//! The generated specification is used by Swagger UI (debug builds) and
//! exported via `cargo run --bin openapi-dump` for external tooling.

use crate::inbound::http::admin_nearby::{
    ClearCacheResponse, ConfigBody, ConfigUpdateBody, ProviderCheckBody,
};
use crate::inbound::http::entities::{
    EntityBody, EntityDeleteResponse, EntityRequest, EntityWriteResponse, PropagationBody,
};
use crate::inbound::http::nearby::{
    NearbyItemBody, NearbyResponse, RecomputeRequest, RecomputeResponse,
};
use crate::inbound::http::schemas::{
    CoordinatesSchema, EntityKindSchema, ErrorCodeSchema, ErrorSchema,
};
use utoipa::OpenApi;

/// OpenAPI document for the REST API.
/// Swagger UI is enabled in debug builds only and used by tooling.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nearby backend API",
        description = "Cached nearby lists between geo entities, recompute control and health probes.",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0.html"
        )
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::nearby::get_nearby,
        crate::inbound::http::nearby::recompute_nearby,
        crate::inbound::http::entities::get_entity,
        crate::inbound::http::entities::put_entity,
        crate::inbound::http::entities::delete_entity,
        crate::inbound::http::admin_nearby::clear_cache,
        crate::inbound::http::admin_nearby::get_config,
        crate::inbound::http::admin_nearby::update_config,
        crate::inbound::http::admin_nearby::provider_check,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        ErrorSchema,
        ErrorCodeSchema,
        EntityKindSchema,
        CoordinatesSchema,
        NearbyResponse,
        NearbyItemBody,
        RecomputeRequest,
        RecomputeResponse,
        EntityBody,
        EntityRequest,
        EntityWriteResponse,
        EntityDeleteResponse,
        PropagationBody,
        ClearCacheResponse,
        ConfigBody,
        ConfigUpdateBody,
        ProviderCheckBody,
    )),
    tags(
        (name = "nearby", description = "Cached nearby lists and recompute triggers"),
        (name = "entities", description = "Entity writes that invalidate nearby lists"),
        (name = "admin", description = "Operator controls for the nearby cache"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
