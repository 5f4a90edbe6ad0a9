//! Entity mutations that keep nearby lists coherent.

use std::sync::Arc;

use tracing::info;

use super::nearby::{InvalidationPropagator, PropagationReport};
use super::ports::EntityStore;
use super::{Entity, EntityId, Error};

/// Result of [`EntityService::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedEntity {
    /// Stored entity.
    pub entity: Entity,
    /// Whether the entity did not exist before.
    pub created: bool,
    /// Invalidation fan-out.
    pub propagation: PropagationReport,
}

/// Create, update and delete entities, then propagate the change.
pub struct EntityService {
    store: Arc<dyn EntityStore>,
    propagator: Arc<InvalidationPropagator>,
}

impl EntityService {
    /// Build the service.
    pub fn new(store: Arc<dyn EntityStore>, propagator: Arc<InvalidationPropagator>) -> Self {
        Self { store, propagator }
    }

    /// Load one entity.
    pub async fn find(&self, id: EntityId) -> Result<Entity, Error> {
        self.store
            .find_entity(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("entity {id} not found")))
    }

    /// Insert or replace `entity` and invalidate affected lists.
    pub async fn save(&self, entity: Entity) -> Result<SavedEntity, Error> {
        let previous = self.store.upsert_entity(&entity).await?;
        let propagation = self.propagator.on_saved(&entity, previous.as_ref()).await;
        info!(entity = %entity.id, created = previous.is_none(), "entity saved");
        Ok(SavedEntity {
            created: previous.is_none(),
            entity,
            propagation,
        })
    }

    /// Delete an entity and invalidate lists that could have listed it.
    ///
    /// The entity's own payloads go with the row. Nothing is cleared or
    /// enqueued when the delete fails.
    pub async fn delete(&self, id: EntityId) -> Result<PropagationReport, Error> {
        let entity = self.find(id).await?;
        let counted = self.propagator.count_lists(&entity).await;
        self.store.delete_entity(id).await?;
        info!(entity = %id, "entity deleted");
        Ok(self.propagator.on_deleted(&entity, counted).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nearby::{CacheStore, NearbyConfig, NearbyConfigStore, RecomputeDispatcher};
    use crate::domain::ports::{EntityStoreError, MockEntityStore, StoredAttribute};
    use crate::domain::{CacheSlot, EntityKind};
    use crate::outbound::memory::InMemoryEntityStore;
    use crate::test_support::{RecordingQueue, sample_entity};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    fn service(store: Arc<dyn EntityStore>, queue: Arc<RecordingQueue>) -> EntityService {
        let propagator = InvalidationPropagator::new(
            store.clone(),
            CacheStore::new(store.clone()),
            Arc::new(RecomputeDispatcher::new(vec![queue])),
            Arc::new(NearbyConfigStore::new(NearbyConfig::default())),
        );
        EntityService::new(store, Arc::new(propagator))
    }

    #[rstest]
    #[tokio::test]
    async fn failed_delete_keeps_payloads_and_enqueues_nothing() {
        let poi = sample_entity(10, EntityKind::Poi, 45.0, 7.0);
        let found = poi.clone();
        let mut store = MockEntityStore::new();
        store
            .expect_find_entity()
            .returning(move |_| Ok(Some(found.clone())));
        store.expect_read_attribute().returning(|_, _| {
            let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid");
            Ok(Some(StoredAttribute {
                value: json!({ "items": [] }),
                updated_at: at,
            }))
        });
        store
            .expect_delete_entity()
            .times(1)
            .returning(|_| Err(EntityStoreError::connection("database unavailable")));
        store.expect_delete_attribute().never();
        store.expect_entities_within().never();
        let queue = Arc::new(RecordingQueue::default());

        let result = service(Arc::new(store), queue.clone()).delete(poi.id).await;

        assert!(result.is_err());
        assert!(queue.jobs().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn delete_removes_payloads_with_the_row() {
        let poi = sample_entity(10, EntityKind::Poi, 45.0, 7.0);
        let store = Arc::new(InMemoryEntityStore::with_entities([
            poi.clone(),
            sample_entity(11, EntityKind::ChargingPoint, 45.002, 7.0),
        ]));
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid");
        CacheStore::new(store.clone())
            .write(poi.id, CacheSlot::NearbyChargers, &Default::default(), at)
            .await
            .expect("seed payload");
        let queue = Arc::new(RecordingQueue::default());

        let report = service(store.clone(), queue.clone())
            .delete(poi.id)
            .await
            .expect("delete");

        assert_eq!(report.cleared, 1);
        assert_eq!(report.queued, 1);
        assert_eq!(store.attribute_count("nearby_chargers").await, 0);
        assert!(store.find_entity(poi.id).await.expect("read").is_none());
    }
}
