//! OpenAPI schema definitions for domain types.
//!
//! Domain types do not derive `ToSchema`. These wrappers mirror their JSON
//! shape so the inbound adapter can document them without coupling the
//! domain to utoipa.

use utoipa::ToSchema;

/// OpenAPI schema for [`crate::domain::ErrorCode`].
#[derive(ToSchema)]
#[schema(as = crate::domain::ErrorCode)]
pub enum ErrorCodeSchema {
    /// Malformed identifier, unknown kind or out-of-range field.
    #[schema(rename = "invalid_request")]
    InvalidRequest,
    /// Origin entity does not exist.
    #[schema(rename = "not_found")]
    NotFound,
    /// Entity store unreachable.
    #[schema(rename = "service_unavailable")]
    ServiceUnavailable,
    /// Unexpected failure; the message is redacted.
    #[schema(rename = "internal_error")]
    InternalError,
}

/// OpenAPI schema for [`crate::domain::Error`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Error)]
#[schema(rename_all = "camelCase")]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct ErrorSchema {
    /// Stable machine-readable error code.
    #[schema(example = "invalid_request")]
    code: ErrorCodeSchema,
    /// Human-readable message.
    #[schema(example = "kind must be one of charging_point, poi, camp_spot")]
    message: String,
    /// Correlation identifier, also sent as the `trace-id` header.
    #[schema(example = "6f1c0a4e-2b8d-4c1e-9a53-0d2f6b7e8c91")]
    trace_id: Option<String>,
    /// Field-level context for validation failures.
    details: Option<serde_json::Value>,
}

/// OpenAPI schema for [`crate::domain::EntityKind`].
#[derive(ToSchema)]
#[schema(as = crate::domain::EntityKind)]
pub enum EntityKindSchema {
    /// Vehicle charging station.
    #[schema(rename = "charging_point")]
    ChargingPoint,
    /// Point of interest.
    #[schema(rename = "poi")]
    Poi,
    /// Campsite or RV spot.
    #[schema(rename = "camp_spot")]
    CampSpot,
}

/// OpenAPI schema for [`crate::domain::Coordinates`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Coordinates)]
#[expect(
    dead_code,
    reason = "Used only for OpenAPI schema generation via utoipa"
)]
pub struct CoordinatesSchema {
    /// Latitude in degrees.
    #[schema(example = 52.52)]
    lat: f64,
    /// Longitude in degrees.
    #[schema(example = 13.405)]
    lng: f64,
}
