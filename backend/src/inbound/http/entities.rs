//! Entity CRUD endpoints.
//!
//! Writes and deletes run invalidation propagation before responding, so the
//! response reports which cached lists were queued for recompute.
//!
//! ```text
//! GET    /api/v1/entities/42
//! PUT    /api/v1/entities/42 {"kind":"poi","lat":52.52,"lng":13.405,"title":"Museum"}
//! DELETE /api/v1/entities/42
//! ```

use actix_web::{HttpResponse, delete, get, put, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::domain::Entity;
use crate::domain::nearby::PropagationReport;
use crate::inbound::http::ApiResult;
use crate::inbound::http::nearby::CoordinatesBody;
use crate::inbound::http::schemas::{EntityKindSchema, ErrorSchema};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, metadata_object, parse_coordinates, parse_entity_id, parse_kind, require_title,
};

/// Stored entity.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntityBody {
    pub id: i64,
    #[schema(value_type = EntityKindSchema)]
    pub kind: String,
    pub coordinates: CoordinatesBody,
    pub title: String,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

impl From<Entity> for EntityBody {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id.get(),
            kind: entity.kind.as_str().to_owned(),
            coordinates: CoordinatesBody {
                lat: entity.coordinates.lat,
                lng: entity.coordinates.lng,
            },
            title: entity.title,
            metadata: entity.metadata,
        }
    }
}

/// Counts of the invalidation work triggered by a write.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropagationBody {
    /// Neighbouring entities inspected.
    pub neighbours: usize,
    /// Recompute jobs accepted by a queue.
    pub queued: usize,
    /// Jobs already pending for the same slot.
    pub already_pending: usize,
    /// Jobs no queue accepted.
    pub dropped: usize,
    /// Cache slots cleared outright.
    pub cleared: usize,
    /// Neighbours whose invalidation failed.
    pub failures: usize,
}

impl From<PropagationReport> for PropagationBody {
    fn from(report: PropagationReport) -> Self {
        Self {
            neighbours: report.neighbours,
            queued: report.queued,
            already_pending: report.already_pending,
            dropped: report.dropped,
            cleared: report.cleared,
            failures: report.failures,
        }
    }
}

/// Entity write body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EntityRequest {
    #[schema(value_type = EntityKindSchema)]
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

/// Entity write result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntityWriteResponse {
    pub entity: EntityBody,
    pub propagation: PropagationBody,
}

/// Entity delete result.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntityDeleteResponse {
    pub propagation: PropagationBody,
}

/// Fetch one entity.
#[utoipa::path(
    get,
    path = "/api/v1/entities/{id}",
    params(("id" = i64, Path, description = "Entity id")),
    responses(
        (status = 200, description = "Entity", body = EntityBody),
        (status = 400, description = "Invalid id", body = ErrorSchema),
        (status = 404, description = "Not found", body = ErrorSchema),
        (status = 503, description = "Entity store unavailable", body = ErrorSchema)
    ),
    tags = ["entities"],
    operation_id = "getEntity"
)]
#[get("/entities/{id}")]
pub async fn get_entity(
    state: web::Data<HttpState>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let id = parse_entity_id(path.into_inner(), FieldName::new("id"))?;
    let entity = state.entities.find(id).await?;
    Ok(HttpResponse::Ok().json(EntityBody::from(entity)))
}

/// Create or replace an entity and invalidate affected nearby lists.
#[utoipa::path(
    put,
    path = "/api/v1/entities/{id}",
    params(("id" = i64, Path, description = "Entity id")),
    request_body = EntityRequest,
    responses(
        (status = 200, description = "Entity replaced", body = EntityWriteResponse),
        (status = 201, description = "Entity created", body = EntityWriteResponse),
        (status = 400, description = "Invalid entity", body = ErrorSchema),
        (status = 503, description = "Entity store unavailable", body = ErrorSchema)
    ),
    tags = ["entities"],
    operation_id = "putEntity"
)]
#[put("/entities/{id}")]
pub async fn put_entity(
    state: web::Data<HttpState>,
    path: web::Path<i64>,
    payload: web::Json<EntityRequest>,
) -> ApiResult<HttpResponse> {
    let request = payload.into_inner();
    let entity = Entity {
        id: parse_entity_id(path.into_inner(), FieldName::new("id"))?,
        kind: parse_kind(&request.kind, FieldName::new("kind"))?,
        coordinates: parse_coordinates(request.lat, request.lng)?,
        title: require_title(request.title)?,
        metadata: metadata_object(request.metadata)?,
    };

    let saved = state.entities.save(entity).await?;
    let body = EntityWriteResponse {
        entity: saved.entity.into(),
        propagation: saved.propagation.into(),
    };
    let response = if saved.created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    };
    Ok(response)
}

/// Delete an entity and invalidate affected nearby lists.
#[utoipa::path(
    delete,
    path = "/api/v1/entities/{id}",
    params(("id" = i64, Path, description = "Entity id")),
    responses(
        (status = 200, description = "Entity deleted", body = EntityDeleteResponse),
        (status = 400, description = "Invalid id", body = ErrorSchema),
        (status = 404, description = "Not found", body = ErrorSchema),
        (status = 503, description = "Entity store unavailable", body = ErrorSchema)
    ),
    tags = ["entities"],
    operation_id = "deleteEntity"
)]
#[delete("/entities/{id}")]
pub async fn delete_entity(
    state: web::Data<HttpState>,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let id = parse_entity_id(path.into_inner(), FieldName::new("id"))?;
    let propagation = state.entities.delete(id).await?;
    Ok(HttpResponse::Ok().json(EntityDeleteResponse {
        propagation: propagation.into(),
    }))
}
