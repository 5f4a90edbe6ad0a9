//! PostgreSQL-backed entity store.
//!
//! Entities and their attributes live in two tables; attribute rows cascade
//! when their entity is deleted. Radius lookups prefilter on a bounding box in
//! SQL and rank by exact distance in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Double, Jsonb, Text, Timestamptz};
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde_json::Value;

use crate::domain::ports::{
    EntityStore, EntityStoreError, Neighbour, RadiusQuery, StoredAttribute,
};
use crate::domain::{Entity, EntityId};

use super::diesel_helpers::{affected_rows, map_diesel_error, map_pool_error};
use super::models::{AttributeRow, EntityRow};
use super::pool::DbPool;
use super::schema::{entities, entity_attributes};

/// Upsert returning the row as it was before the write. The data-modifying
/// CTE runs even when `previous` is empty.
const UPSERT_ENTITY_SQL: &str = r#"
WITH previous AS (
    SELECT id, kind, lat, lng, title, metadata FROM entities WHERE id = $1
), upserted AS (
    INSERT INTO entities (id, kind, lat, lng, title, metadata, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, now(), now())
    ON CONFLICT (id) DO UPDATE SET
        kind = EXCLUDED.kind,
        lat = EXCLUDED.lat,
        lng = EXCLUDED.lng,
        title = EXCLUDED.title,
        metadata = EXCLUDED.metadata,
        updated_at = EXCLUDED.updated_at
    RETURNING id
)
SELECT previous.id, previous.kind, previous.lat, previous.lng, previous.title, previous.metadata
FROM previous, upserted
"#;

const INSERT_UNLESS_FRESH_SQL: &str = r#"
INSERT INTO entity_attributes (entity_id, key, value, updated_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (entity_id, key) DO UPDATE SET
    value = EXCLUDED.value,
    updated_at = EXCLUDED.updated_at
WHERE entity_attributes.updated_at < $5
"#;

/// Diesel-backed implementation of [`EntityStore`].
#[derive(Clone)]
pub struct DieselEntityStore {
    pool: DbPool,
}

impl DieselEntityStore {
    /// Create a store over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_entity(row: EntityRow) -> Result<Entity, EntityStoreError> {
    Entity::try_from(row).map_err(EntityStoreError::corrupt)
}

#[async_trait]
impl EntityStore for DieselEntityStore {
    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<EntityRow> = entities::table
            .filter(entities::id.eq(id.get()))
            .select(EntityRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "find entity"))?;
        row.map(to_entity).transpose()
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<Option<Entity>, EntityStoreError> {
        let metadata = Value::Object(entity.metadata.clone());
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let previous: Vec<EntityRow> = sql_query(UPSERT_ENTITY_SQL)
            .bind::<BigInt, _>(entity.id.get())
            .bind::<Text, _>(entity.kind.as_str())
            .bind::<Double, _>(entity.coordinates.lat)
            .bind::<Double, _>(entity.coordinates.lng)
            .bind::<Text, _>(&entity.title)
            .bind::<Jsonb, _>(&metadata)
            .load(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "upsert entity"))?;
        previous.into_iter().next().map(to_entity).transpose()
    }

    async fn delete_entity(&self, id: EntityId) -> Result<bool, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(entities::table.filter(entities::id.eq(id.get())))
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "delete entity"))?;
        Ok(deleted > 0)
    }

    async fn entities_within(
        &self,
        query: &RadiusQuery,
    ) -> Result<Vec<Neighbour>, EntityStoreError> {
        let bounds = query.bounding_box();
        let mut sql = entities::table
            .filter(entities::kind.eq(query.kind.as_str()))
            .filter(entities::lat.between(bounds.min_lat, bounds.max_lat))
            .filter(entities::lng.between(bounds.min_lng, bounds.max_lng))
            .select(EntityRow::as_select())
            .into_boxed();
        if let Some(exclude) = query.exclude {
            sql = sql.filter(entities::id.ne(exclude.get()));
        }

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<EntityRow> = sql
            .load(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "radius lookup"))?;
        let candidates = rows
            .into_iter()
            .map(to_entity)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.rank(candidates))
    }

    async fn read_attribute(
        &self,
        id: EntityId,
        key: &str,
    ) -> Result<Option<StoredAttribute>, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<AttributeRow> = entity_attributes::table
            .filter(entity_attributes::entity_id.eq(id.get()))
            .filter(entity_attributes::key.eq(key))
            .select(AttributeRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "read attribute"))?;
        Ok(row.map(StoredAttribute::from))
    }

    async fn write_attribute(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(entity_attributes::table)
            .values((
                entity_attributes::entity_id.eq(id.get()),
                entity_attributes::key.eq(key),
                entity_attributes::value.eq(value),
                entity_attributes::updated_at.eq(now),
            ))
            .on_conflict((entity_attributes::entity_id, entity_attributes::key))
            .do_update()
            .set((
                entity_attributes::value.eq(excluded(entity_attributes::value)),
                entity_attributes::updated_at.eq(excluded(entity_attributes::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "write attribute"))?;
        Ok(())
    }

    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<bool, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            entity_attributes::table
                .filter(entity_attributes::entity_id.eq(id.get()))
                .filter(entity_attributes::key.eq(key)),
        )
        .execute(&mut conn)
        .await
        .map_err(|err| map_diesel_error(err, "delete attribute"))?;
        Ok(deleted > 0)
    }

    async fn insert_attribute_unless_fresh(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let written = sql_query(INSERT_UNLESS_FRESH_SQL)
            .bind::<BigInt, _>(id.get())
            .bind::<Text, _>(key)
            .bind::<Jsonb, _>(value)
            .bind::<Timestamptz, _>(now)
            .bind::<Timestamptz, _>(stale_before)
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "conditional attribute insert"))?;
        Ok(written > 0)
    }

    async fn delete_attribute_everywhere(&self, key: &str) -> Result<u64, EntityStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted =
            diesel::delete(entity_attributes::table.filter(entity_attributes::key.eq(key)))
                .execute(&mut conn)
                .await
                .map_err(|err| map_diesel_error(err, "bulk attribute delete"))?;
        Ok(affected_rows(deleted))
    }
}
