//! Nearby list endpoints.
//!
//! ```text
//! GET  /api/v1/nearby?originId=42&kind=charging_point&limit=10
//! POST /api/v1/nearby/recompute {"originId":42,"kind":"poi","sync":false}
//! ```
//!
//! Bodies use camelCase like the rest of the API. Unit suffixes survive the
//! rename (`distanceM`, `durationS`, `retryAfterS`) so every number names
//! its unit.

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::domain::nearby::{
    DispatchOutcome, EnrichedItem, NearbyQuery, NearbyView, Progress, RecomputeReport,
    RecomputeRun,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::{EntityKindSchema, ErrorSchema};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, parse_entity_id, parse_optional_kind};

/// Query string of the nearby read.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct NearbyParams {
    /// Origin entity id.
    #[serde(alias = "origin_id")]
    pub origin_id: i64,
    /// Target kind; defaults to the origin's first listed kind.
    pub kind: Option<String>,
    /// Maximum items, clamped to 1..=50.
    pub limit: Option<u32>,
}

/// Position in a response body.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CoordinatesBody {
    /// Latitude in degrees.
    #[schema(example = 52.52)]
    pub lat: f64,
    /// Longitude in degrees.
    #[schema(example = 13.405)]
    pub lng: f64,
}

/// One nearby target merged with its live display data.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyItemBody {
    /// Target entity id.
    pub id: i64,
    /// Target entity kind.
    #[schema(value_type = EntityKindSchema)]
    pub kind: String,
    /// Travel distance in metres.
    pub distance_m: u64,
    /// Travel time in seconds.
    pub duration_s: u64,
    /// Routing provider name, or `estimator` for direct-line guesses.
    pub provider: String,
    /// Movement profile the figures were computed for.
    pub profile: String,
    /// True when the figures are a straight-line estimate.
    pub direct_line: bool,
    /// Current title of the target.
    pub title: String,
    /// Current position of the target.
    pub coordinates: CoordinatesBody,
    /// Current display metadata of the target.
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

impl From<EnrichedItem> for NearbyItemBody {
    fn from(value: EnrichedItem) -> Self {
        let EnrichedItem { item, entity } = value;
        Self {
            id: item.id.get(),
            kind: item.kind.as_str().to_owned(),
            distance_m: item.distance_m,
            duration_s: item.duration_s,
            provider: item.provider,
            profile: item.profile,
            direct_line: item.direct_line,
            title: entity.title,
            coordinates: CoordinatesBody {
                lat: entity.coordinates.lat,
                lng: entity.coordinates.lng,
            },
            metadata: entity.metadata,
        }
    }
}

/// Batch progress of the current or last recompute.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ProgressBody {
    /// Batches written so far.
    pub done: u32,
    /// Batches planned for the run.
    pub total: u32,
}

impl From<Progress> for ProgressBody {
    fn from(value: Progress) -> Self {
        Self {
            done: value.done,
            total: value.total,
        }
    }
}

/// What happened to a refresh request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchBody {
    /// `queued`, `already_pending` or `dropped`.
    #[schema(example = "queued")]
    pub status: &'static str,
    /// Backend that accepted the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
}

impl From<DispatchOutcome> for DispatchBody {
    fn from(value: DispatchOutcome) -> Self {
        match value {
            DispatchOutcome::Queued { backend } => Self {
                status: "queued",
                backend: Some(backend),
            },
            DispatchOutcome::AlreadyPending => Self {
                status: "already_pending",
                backend: None,
            },
            DispatchOutcome::Dropped => Self {
                status: "dropped",
                backend: None,
            },
        }
    }
}

/// Nearby list with freshness and provider state.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyResponse {
    /// Origin entity id.
    pub origin_id: i64,
    /// Target kind of the list.
    #[schema(value_type = EntityKindSchema)]
    pub kind: String,
    /// Cached items, nearest first.
    pub items: Vec<NearbyItemBody>,
    /// The list is missing or older than the cache TTL.
    pub stale: bool,
    /// The last recompute has not written every batch.
    pub partial: bool,
    /// A recompute currently holds the lock.
    pub running: bool,
    /// Batch progress of the current or last recompute.
    pub progress: ProgressBody,
    /// RFC 3339 time of the last completed recompute.
    pub computed_at: Option<String>,
    /// Last provider failure class (`rate_limited`, `unauthorized`, ...).
    pub error: Option<String>,
    /// RFC 3339 time of the last provider failure.
    pub error_at: Option<String>,
    /// Provider cooldown in seconds.
    pub retry_after_s: Option<u64>,
    /// Earliest refresh time while a provider cooldown is active.
    pub next_retry_at: Option<String>,
    /// Present when this read triggered a refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<DispatchBody>,
}

impl From<NearbyView> for NearbyResponse {
    fn from(view: NearbyView) -> Self {
        Self {
            origin_id: view.origin.get(),
            kind: view.slot.target_kind().as_str().to_owned(),
            items: view.items.into_iter().map(NearbyItemBody::from).collect(),
            stale: view.stale,
            partial: view.partial,
            running: view.running,
            progress: view.progress.into(),
            computed_at: view.computed_at.map(|at| at.to_rfc3339()),
            error: view.error.map(String::from),
            error_at: view.error_at.map(|at| at.to_rfc3339()),
            retry_after_s: view.retry_after_s,
            next_retry_at: view.next_retry_at.map(|at| at.to_rfc3339()),
            refresh: view.refresh.map(DispatchBody::from),
        }
    }
}

/// Read the nearby list of one origin.
#[utoipa::path(
    get,
    path = "/api/v1/nearby",
    params(NearbyParams),
    responses(
        (status = 200, description = "Nearby list", body = NearbyResponse),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 404, description = "Origin not found", body = ErrorSchema),
        (status = 503, description = "Entity store unavailable", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["nearby"],
    operation_id = "getNearby"
)]
#[get("/nearby")]
pub async fn get_nearby(
    state: web::Data<HttpState>,
    params: web::Query<NearbyParams>,
) -> ApiResult<HttpResponse> {
    let params = params.into_inner();
    let query = NearbyQuery {
        origin: parse_entity_id(params.origin_id, FieldName::new("originId"))?,
        kind: parse_optional_kind(params.kind.as_deref(), FieldName::new("kind"))?,
        limit: params.limit,
    };
    let view = state.nearby.get(query).await?;
    Ok(HttpResponse::Ok().json(NearbyResponse::from(view)))
}

/// Recompute trigger body.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeRequest {
    /// Origin entity id.
    #[serde(alias = "origin_id")]
    pub origin_id: i64,
    /// Target kind; defaults to the origin's first listed kind.
    #[schema(value_type = Option<EntityKindSchema>)]
    pub kind: Option<String>,
    /// Run inline and wait for the provider.
    #[serde(default)]
    pub sync: bool,
}

/// Outcome of an inline recompute.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeRunBody {
    /// `completed`, `provider_failed` or `skipped`.
    pub status: &'static str,
    /// Whether the worker got past the lock.
    pub ran: bool,
    /// Items written by a completed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
    /// Provider failure class of a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider cooldown in seconds after a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_s: Option<u64>,
}

impl From<RecomputeRun> for RecomputeRunBody {
    fn from(run: RecomputeRun) -> Self {
        let ran = run.ran();
        match run {
            RecomputeRun::Skipped => Self {
                status: "skipped",
                ran,
                items: None,
                error: None,
                retry_after_s: None,
            },
            RecomputeRun::Completed { items } => Self {
                status: "completed",
                ran,
                items: Some(items),
                error: None,
                retry_after_s: None,
            },
            RecomputeRun::ProviderFailed {
                class,
                retry_after_s,
            } => Self {
                status: "provider_failed",
                ran,
                items: None,
                error: Some(class.into()),
                retry_after_s,
            },
        }
    }
}

/// Recompute response: `run` for inline requests, `dispatch` otherwise.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResponse {
    /// `sync` or `async`.
    #[schema(example = "async")]
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RecomputeRunBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchBody>,
}

/// Force a recompute inline or through the job queue.
#[utoipa::path(
    post,
    path = "/api/v1/nearby/recompute",
    request_body = RecomputeRequest,
    responses(
        (status = 200, description = "Inline recompute finished", body = RecomputeResponse),
        (status = 202, description = "Recompute dispatched", body = RecomputeResponse),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 404, description = "Origin not found", body = ErrorSchema),
        (status = 500, description = "Internal server error", body = ErrorSchema)
    ),
    tags = ["nearby"],
    operation_id = "recomputeNearby"
)]
#[post("/nearby/recompute")]
pub async fn recompute_nearby(
    state: web::Data<HttpState>,
    payload: web::Json<RecomputeRequest>,
) -> ApiResult<HttpResponse> {
    let request = payload.into_inner();
    let origin = parse_entity_id(request.origin_id, FieldName::new("originId"))?;
    let kind = parse_optional_kind(request.kind.as_deref(), FieldName::new("kind"))?;

    let response = match state.nearby.recompute(origin, kind, request.sync).await? {
        RecomputeReport::Ran(run) => HttpResponse::Ok().json(RecomputeResponse {
            mode: "sync",
            run: Some(run.into()),
            dispatch: None,
        }),
        RecomputeReport::Dispatched(outcome) => HttpResponse::Accepted().json(RecomputeResponse {
            mode: "async",
            run: None,
            dispatch: Some(outcome.into()),
        }),
    };
    Ok(response)
}
