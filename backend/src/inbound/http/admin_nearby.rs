//! Operator endpoints for the nearby cache.
//!
//! ```text
//! DELETE /api/v1/admin/nearby/cache
//! GET    /api/v1/admin/nearby/config
//! PUT    /api/v1/admin/nearby/config {"radiusM":2000,"apiKey":"..."}
//! POST   /api/v1/admin/nearby/provider-check
//! ```
//!
//! The configuration body never echoes the provider key; it reports whether
//! one is configured and its short fingerprint.

use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::nearby::{NearbyConfig, NearbyConfigUpdate, ProviderCheck};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::state::HttpState;

/// Result of a cache wipe.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ClearCacheResponse {
    /// Number of cache entries removed.
    pub cleared: u64,
}

/// Clear every cached nearby list, lock and provider state.
#[utoipa::path(
    delete,
    path = "/api/v1/admin/nearby/cache",
    responses(
        (status = 200, description = "Cache cleared", body = ClearCacheResponse),
        (status = 503, description = "Entity store unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["admin"],
    operation_id = "clearNearbyCache"
)]
#[delete("/admin/nearby/cache")]
pub async fn clear_cache(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let cleared = state.nearby.clear_cache().await?;
    Ok(HttpResponse::Ok().json(ClearCacheResponse { cleared }))
}

/// Live nearby configuration.
///
/// `provider` names the routing adapter wired at startup; it is not a
/// configurable value.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBody {
    #[schema(example = "openrouteservice")]
    pub provider: String,
    pub api_key_configured: bool,
    /// Short SHA-256 prefix of the configured key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_fingerprint: Option<String>,
    #[schema(example = "foot-walking")]
    pub profile: String,
    pub radius_m: u32,
    pub max_candidates: u32,
    pub batch_size: u32,
    pub result_limit: u32,
    pub ttl_s: u64,
    pub walking_speed_mps: f64,
    pub auto_refresh: bool,
}

impl ConfigBody {
    /// Describe `config` as served by the `provider` adapter.
    pub fn new(config: &NearbyConfig, provider: &str) -> Self {
        Self {
            provider: provider.to_owned(),
            api_key_configured: config.api_key.is_some(),
            api_key_fingerprint: config.api_key.as_ref().map(|key| key.fingerprint()),
            profile: config.profile.clone(),
            radius_m: config.radius_m,
            max_candidates: config.max_candidates,
            batch_size: config.batch_size,
            result_limit: config.result_limit,
            ttl_s: config.ttl_s,
            walking_speed_mps: config.walking_speed_mps,
            auto_refresh: config.auto_refresh,
        }
    }
}

/// Partial configuration update. Out-of-range numbers are clamped.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigUpdateBody {
    /// New provider key; an empty string clears it.
    pub api_key: Option<String>,
    pub profile: Option<String>,
    pub radius_m: Option<u32>,
    pub max_candidates: Option<u32>,
    pub batch_size: Option<u32>,
    pub result_limit: Option<u32>,
    pub ttl_s: Option<u64>,
    pub walking_speed_mps: Option<f64>,
    pub auto_refresh: Option<bool>,
}

impl From<ConfigUpdateBody> for NearbyConfigUpdate {
    fn from(body: ConfigUpdateBody) -> Self {
        Self {
            api_key: body.api_key,
            profile: body.profile,
            radius_m: body.radius_m,
            max_candidates: body.max_candidates,
            batch_size: body.batch_size,
            result_limit: body.result_limit,
            ttl_s: body.ttl_s,
            walking_speed_mps: body.walking_speed_mps,
            auto_refresh: body.auto_refresh,
        }
    }
}

/// Read the live configuration.
#[utoipa::path(
    get,
    path = "/api/v1/admin/nearby/config",
    responses(
        (status = 200, description = "Current configuration", body = ConfigBody)
    ),
    tags = ["admin"],
    operation_id = "getNearbyConfig"
)]
#[get("/admin/nearby/config")]
pub async fn get_config(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let config = state.nearby.config();
    Ok(HttpResponse::Ok().json(ConfigBody::new(&config, state.nearby.provider_name())))
}

/// Update the live configuration.
#[utoipa::path(
    put,
    path = "/api/v1/admin/nearby/config",
    request_body = ConfigUpdateBody,
    responses(
        (status = 200, description = "Updated configuration", body = ConfigBody),
        (status = 400, description = "Invalid update", body = ErrorSchema)
    ),
    tags = ["admin"],
    operation_id = "updateNearbyConfig"
)]
#[put("/admin/nearby/config")]
pub async fn update_config(
    state: web::Data<HttpState>,
    payload: web::Json<ConfigUpdateBody>,
) -> ApiResult<HttpResponse> {
    let config = state.nearby.update_config(payload.into_inner().into())?;
    Ok(HttpResponse::Ok().json(ConfigBody::new(&config, state.nearby.provider_name())))
}

/// Result of a provider check.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCheckBody {
    pub ok: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_s: Option<u64>,
    pub latency_ms: u64,
}

impl From<ProviderCheck> for ProviderCheckBody {
    fn from(check: ProviderCheck) -> Self {
        Self {
            ok: check.ok,
            provider: check.provider,
            status: check.status,
            error: check.error.map(String::from),
            message: check.message,
            retry_after_s: check.retry_after_s,
            latency_ms: check.latency_ms,
        }
    }
}

/// Check the routing provider with a one-destination matrix call.
///
/// Provider failures are reported in the body with status 200; only
/// internal faults produce an error envelope.
#[utoipa::path(
    post,
    path = "/api/v1/admin/nearby/provider-check",
    responses(
        (status = 200, description = "Check result", body = ProviderCheckBody),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["admin"],
    operation_id = "checkNearbyProvider"
)]
#[post("/admin/nearby/provider-check")]
pub async fn provider_check(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let check = state.nearby.check_provider().await?;
    Ok(HttpResponse::Ok().json(ProviderCheckBody::from(check)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ApiKey;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn config_body_hides_the_key() {
        let config = NearbyConfig {
            api_key: ApiKey::new("secret"),
            ..NearbyConfig::default()
        };
        let body = serde_json::to_value(ConfigBody::new(&config, "openrouteservice"))
            .expect("serialises");

        assert_eq!(body["provider"], "openrouteservice");
        assert_eq!(body["apiKeyConfigured"], true);
        assert!(body.get("apiKey").is_none());
        assert!(!body.to_string().contains("secret"));
    }

    #[rstest]
    fn update_body_rejects_unknown_fields() {
        let result = serde_json::from_value::<ConfigUpdateBody>(json!({ "provider": "osrm" }));
        assert!(result.is_err());
    }

    #[rstest]
    fn update_body_maps_every_field() {
        let body: ConfigUpdateBody = serde_json::from_value(json!({
            "apiKey": "",
            "radiusM": 2000,
            "autoRefresh": false
        }))
        .expect("valid update");
        let update = NearbyConfigUpdate::from(body);

        assert_eq!(update.api_key.as_deref(), Some(""));
        assert_eq!(update.radius_m, Some(2000));
        assert_eq!(update.auto_refresh, Some(false));
        assert!(update.profile.is_none());
    }
}
