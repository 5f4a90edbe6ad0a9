//! Driven port for entity and per-entity attribute storage.
//!
//! The nearby cache keeps its payloads and lock flags as JSON attributes on
//! the origin entity, so this port covers both entity CRUD and a small
//! key-value surface. Radius lookups are part of the port because the
//! candidate selector and the invalidation propagator both need them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::define_port_error;
use crate::domain::nearby::geo::{BoundingBox, haversine_m};
use crate::domain::{Coordinates, Entity, EntityId, EntityKind, Error};

define_port_error! {
    /// Errors raised by entity store adapters.
    pub enum EntityStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "entity store connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "entity store query failed: {message}",
        /// Stored row could not be mapped into a domain value.
        Corrupt { message: String } => "entity store returned corrupt data: {message}",
    }
}

impl From<EntityStoreError> for Error {
    fn from(err: EntityStoreError) -> Self {
        match err {
            EntityStoreError::Connection { message } => Error::service_unavailable(message),
            EntityStoreError::Query { message } | EntityStoreError::Corrupt { message } => {
                Error::internal(message)
            }
        }
    }
}

/// Entities of one kind around a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    /// Search centre.
    pub center: Coordinates,
    /// Great-circle radius in metres.
    pub radius_m: f64,
    /// Kind of entity to return.
    pub kind: EntityKind,
    /// Entity to leave out of the result, usually the origin itself.
    pub exclude: Option<EntityId>,
    /// Maximum number of results; `None` returns every match.
    pub limit: Option<usize>,
}

impl RadiusQuery {
    /// Coarse prefilter adapters can push down to an index.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::around(self.center, self.radius_m)
    }

    /// Apply the exact haversine filter to prefiltered rows.
    ///
    /// Rows of other kinds and the excluded entity are dropped; the rest are
    /// ordered by direct distance (ties by id) and truncated to `limit`.
    pub fn rank(&self, rows: impl IntoIterator<Item = Entity>) -> Vec<Neighbour> {
        let mut ranked: Vec<Neighbour> = rows
            .into_iter()
            .filter(|entity| entity.kind == self.kind && Some(entity.id) != self.exclude)
            .filter_map(|entity| {
                let distance_m = haversine_m(self.center, entity.coordinates);
                (distance_m <= self.radius_m).then_some(Neighbour { entity, distance_m })
            })
            .collect();
        ranked.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        if let Some(limit) = self.limit {
            ranked.truncate(limit);
        }
        ranked
    }
}

/// Entity returned by a radius query with its direct distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    /// Matching entity.
    pub entity: Entity,
    /// Great-circle distance from the query centre in metres.
    pub distance_m: f64,
}

/// Attribute value with its last write time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAttribute {
    /// JSON value.
    pub value: Value,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Entity and attribute storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load one entity.
    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, EntityStoreError>;

    /// Insert or replace an entity, returning the previous version if any.
    async fn upsert_entity(&self, entity: &Entity) -> Result<Option<Entity>, EntityStoreError>;

    /// Delete an entity and its attributes. Returns whether it existed.
    async fn delete_entity(&self, id: EntityId) -> Result<bool, EntityStoreError>;

    /// Entities matching `query`, nearest first.
    async fn entities_within(&self, query: &RadiusQuery)
    -> Result<Vec<Neighbour>, EntityStoreError>;

    /// Read one attribute.
    async fn read_attribute(
        &self,
        id: EntityId,
        key: &str,
    ) -> Result<Option<StoredAttribute>, EntityStoreError>;

    /// Write one attribute, replacing any previous value.
    async fn write_attribute(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), EntityStoreError>;

    /// Delete one attribute. Returns whether it existed.
    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<bool, EntityStoreError>;

    /// Atomically write `value` unless a copy written at or after
    /// `stale_before` already exists.
    ///
    /// Returns `true` when this call wrote the attribute.
    async fn insert_attribute_unless_fresh(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, EntityStoreError>;

    /// Delete `key` from every entity. Returns the number of rows removed.
    async fn delete_attribute_everywhere(&self, key: &str) -> Result<u64, EntityStoreError>;
}
