//! Reads and writes cached payloads through entity attributes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::payload::CachePayload;
use crate::domain::ports::{EntityStore, EntityStoreError};
use crate::domain::{CacheSlot, EntityId};

/// Cache store adapter over the entity store's attribute map.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn EntityStore>,
}

impl CacheStore {
    /// Wrap an entity store.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Load the payload for `origin` and `slot`.
    ///
    /// A payload that no longer decodes is logged and treated as absent so the
    /// next recompute overwrites it.
    pub async fn read(
        &self,
        origin: EntityId,
        slot: CacheSlot,
    ) -> Result<Option<CachePayload>, EntityStoreError> {
        let Some(stored) = self.store.read_attribute(origin, slot.payload_key()).await? else {
            return Ok(None);
        };
        match serde_json::from_value(stored.value) {
            Ok(payload) => Ok(Some(payload)),
            Err(error) => {
                warn!(%origin, %slot, %error, "discarding undecodable nearby payload");
                Ok(None)
            }
        }
    }

    /// Replace the payload for `origin` and `slot`.
    pub async fn write(
        &self,
        origin: EntityId,
        slot: CacheSlot,
        payload: &CachePayload,
        now: DateTime<Utc>,
    ) -> Result<(), EntityStoreError> {
        let value = serde_json::to_value(payload)
            .map_err(|err| EntityStoreError::corrupt(err.to_string()))?;
        self.store
            .write_attribute(origin, slot.payload_key(), &value, now)
            .await
    }

    /// Delete the payload for `origin` and `slot`.
    pub async fn clear(&self, origin: EntityId, slot: CacheSlot) -> Result<bool, EntityStoreError> {
        self.store.delete_attribute(origin, slot.payload_key()).await
    }

    /// Delete every cached payload. Returns the number removed.
    pub async fn clear_all(&self) -> Result<u64, EntityStoreError> {
        let mut removed = 0;
        for slot in CacheSlot::ALL {
            removed += self.store.delete_attribute_everywhere(slot.payload_key()).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nearby::payload::{NearbyItem, Progress, ProviderErrorClass};
    use crate::domain::ports::{MockEntityStore, StoredAttribute};
    use crate::domain::EntityKind;
    use crate::outbound::memory::InMemoryEntityStore;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0)
            .single()
            .expect("valid time")
    }

    fn origin() -> EntityId {
        EntityId::new(11).expect("positive id")
    }

    #[rstest]
    #[tokio::test]
    async fn write_then_read_returns_equal_payload(now: DateTime<Utc>) {
        let cache = CacheStore::new(Arc::new(InMemoryEntityStore::default()));
        let mut payload = CachePayload {
            items: vec![NearbyItem {
                id: EntityId::new(12).expect("positive id"),
                kind: EntityKind::Poi,
                distance_m: 420,
                duration_s: 316,
                provider: "openrouteservice".to_owned(),
                profile: "foot-walking".to_owned(),
                direct_line: false,
            }],
            computed_at: Some(now),
            partial: true,
            progress: Progress { done: 1, total: 3 },
            ..CachePayload::default()
        };
        payload.record_error(ProviderErrorClass::RateLimited, now, Some(45));

        cache
            .write(origin(), CacheSlot::NearbyPois, &payload, now)
            .await
            .expect("write succeeds");
        let read = cache
            .read(origin(), CacheSlot::NearbyPois)
            .await
            .expect("read succeeds");

        assert_eq!(read, Some(payload));
        let other_slot = cache
            .read(origin(), CacheSlot::NearbyChargers)
            .await
            .expect("read succeeds");
        assert_eq!(other_slot, None);
    }

    #[rstest]
    #[tokio::test]
    async fn undecodable_payload_reads_as_absent(now: DateTime<Utc>) {
        let mut store = MockEntityStore::new();
        store
            .expect_read_attribute()
            .withf(|_, key| key == "nearby_chargers")
            .times(1)
            .return_once(move |_, _| {
                Ok(Some(StoredAttribute {
                    value: json!({ "items": "not-a-list" }),
                    updated_at: now,
                }))
            });
        let cache = CacheStore::new(Arc::new(store));

        let read = cache
            .read(origin(), CacheSlot::NearbyChargers)
            .await
            .expect("read succeeds");
        assert!(read.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn clear_all_sums_both_slots() {
        let mut store = MockEntityStore::new();
        store
            .expect_delete_attribute_everywhere()
            .withf(|key| key == "nearby_pois")
            .return_once(|_| Ok(3));
        store
            .expect_delete_attribute_everywhere()
            .withf(|key| key == "nearby_chargers")
            .return_once(|_| Ok(4));
        let cache = CacheStore::new(Arc::new(store));

        assert_eq!(cache.clear_all().await.expect("clear succeeds"), 7);
    }
}
