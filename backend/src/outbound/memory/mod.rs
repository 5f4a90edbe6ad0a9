//! In-process entity store.
//!
//! Used when no database URL is configured and by tests. Attribute writes do
//! not check that the owning entity exists; deleting an entity drops its
//! attributes like the SQL cascade does.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::ports::{
    EntityStore, EntityStoreError, Neighbour, RadiusQuery, StoredAttribute,
};
use crate::domain::{Entity, EntityId};

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<EntityId, Entity>,
    attributes: HashMap<(EntityId, String), StoredAttribute>,
}

/// Entity store backed by a `tokio` read-write lock.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<State>,
}

impl InMemoryEntityStore {
    /// Store seeded with `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let entities = entities.into_iter().map(|entity| (entity.id, entity)).collect();
        Self {
            state: RwLock::new(State {
                entities,
                attributes: HashMap::new(),
            }),
        }
    }

    /// Number of stored attributes named `key`.
    pub async fn attribute_count(&self, key: &str) -> usize {
        self.state
            .read()
            .await
            .attributes
            .keys()
            .filter(|(_, name)| name == key)
            .count()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find_entity(&self, id: EntityId) -> Result<Option<Entity>, EntityStoreError> {
        Ok(self.state.read().await.entities.get(&id).cloned())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<Option<Entity>, EntityStoreError> {
        Ok(self
            .state
            .write()
            .await
            .entities
            .insert(entity.id, entity.clone()))
    }

    async fn delete_entity(&self, id: EntityId) -> Result<bool, EntityStoreError> {
        let mut state = self.state.write().await;
        state.attributes.retain(|(owner, _), _| *owner != id);
        Ok(state.entities.remove(&id).is_some())
    }

    async fn entities_within(
        &self,
        query: &RadiusQuery,
    ) -> Result<Vec<Neighbour>, EntityStoreError> {
        let bbox = query.bounding_box();
        let state = self.state.read().await;
        let rows = state
            .entities
            .values()
            .filter(|entity| bbox.contains(entity.coordinates))
            .cloned();
        Ok(query.rank(rows))
    }

    async fn read_attribute(
        &self,
        id: EntityId,
        key: &str,
    ) -> Result<Option<StoredAttribute>, EntityStoreError> {
        Ok(self
            .state
            .read()
            .await
            .attributes
            .get(&(id, key.to_owned()))
            .cloned())
    }

    async fn write_attribute(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), EntityStoreError> {
        self.state.write().await.attributes.insert(
            (id, key.to_owned()),
            StoredAttribute {
                value: value.clone(),
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<bool, EntityStoreError> {
        Ok(self
            .state
            .write()
            .await
            .attributes
            .remove(&(id, key.to_owned()))
            .is_some())
    }

    async fn insert_attribute_unless_fresh(
        &self,
        id: EntityId,
        key: &str,
        value: &Value,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, EntityStoreError> {
        let mut state = self.state.write().await;
        let slot = (id, key.to_owned());
        if state
            .attributes
            .get(&slot)
            .is_some_and(|existing| existing.updated_at >= stale_before)
        {
            return Ok(false);
        }
        state.attributes.insert(
            slot,
            StoredAttribute {
                value: value.clone(),
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn delete_attribute_everywhere(&self, key: &str) -> Result<u64, EntityStoreError> {
        let mut state = self.state.write().await;
        let before = state.attributes.len();
        state.attributes.retain(|(_, name), _| name != key);
        Ok((before - state.attributes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinates, EntityKind};
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::{Map, json};

    fn entity(id: i64, kind: EntityKind, lat: f64, lng: f64) -> Entity {
        Entity {
            id: EntityId::new(id).expect("positive id"),
            kind,
            coordinates: Coordinates::new(lat, lng).expect("valid coordinates"),
            title: format!("entity {id}"),
            metadata: Map::new(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0)
            .single()
            .expect("valid time")
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_returns_previous_version() {
        let store = InMemoryEntityStore::default();
        let first = entity(1, EntityKind::Poi, 10.0, 10.0);
        let moved = entity(1, EntityKind::Poi, 10.5, 10.0);

        assert_eq!(store.upsert_entity(&first).await.expect("upsert"), None);
        assert_eq!(store.upsert_entity(&moved).await.expect("upsert"), Some(first));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_entity_drops_its_attributes() {
        let store = InMemoryEntityStore::with_entities([entity(1, EntityKind::Poi, 0.0, 0.0)]);
        let id = EntityId::new(1).expect("positive id");
        store
            .write_attribute(id, "nearby_chargers", &json!({}), at(1))
            .await
            .expect("write");

        assert!(store.delete_entity(id).await.expect("delete"));
        assert_eq!(store.attribute_count("nearby_chargers").await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn conditional_insert_respects_freshness() {
        let store = InMemoryEntityStore::default();
        let id = EntityId::new(3).expect("positive id");
        let value = json!({ "acquiredAt": "x" });

        assert!(store
            .insert_attribute_unless_fresh(id, "lock", &value, at(2), at(1))
            .await
            .expect("insert"));
        assert!(!store
            .insert_attribute_unless_fresh(id, "lock", &value, at(3), at(2))
            .await
            .expect("insert"));
        assert!(store
            .insert_attribute_unless_fresh(id, "lock", &value, at(4), at(3))
            .await
            .expect("insert"));
    }

    #[rstest]
    #[tokio::test]
    async fn radius_query_uses_exact_distance() {
        let store = InMemoryEntityStore::with_entities([
            entity(1, EntityKind::ChargingPoint, 0.0, 0.0),
            entity(2, EntityKind::Poi, 0.0, 0.005),
            entity(3, EntityKind::Poi, 0.0085, 0.0085),
        ]);
        let query = RadiusQuery {
            center: Coordinates::new(0.0, 0.0).expect("valid"),
            radius_m: 1_000.0,
            kind: EntityKind::Poi,
            exclude: None,
            limit: None,
        };

        let found = store.entities_within(&query).await.expect("query");
        let ids: Vec<i64> = found.iter().map(|n| n.entity.id.get()).collect();
        assert_eq!(ids, vec![2]);
    }
}
