//! Tests for batched matrix recomputation.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::nearby::config::NearbyConfig;
use crate::domain::nearby::policy::should_refresh_now;
use crate::domain::ports::{ApiKey, MatrixCell, MatrixResponse, MockRoutingProvider};
use crate::domain::EntityId;
use crate::outbound::memory::InMemoryEntityStore;
use crate::test_support::{MutableClock, ScriptedRoutingProvider, sample_entity};

struct World {
    store: Arc<InMemoryEntityStore>,
    cache: CacheStore,
    clock: Arc<MutableClock>,
    origin: Entity,
}

impl World {
    fn job(&self, routing: Arc<dyn RoutingProvider>) -> MatrixJob {
        MatrixJob::new(
            CandidateSelector::new(self.store.clone()),
            routing,
            self.cache.clone(),
            self.clock.clone(),
        )
    }

    async fn payload(&self) -> CachePayload {
        self.cache
            .read(self.origin.id, CacheSlot::NearbyPois)
            .await
            .expect("cache read")
            .expect("payload written")
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0)
        .single()
        .expect("valid time")
}

#[fixture]
fn world() -> World {
    let origin = sample_entity(1, EntityKind::ChargingPoint, 0.0, 0.0);
    let mut entities = vec![origin.clone()];
    entities.extend((2..=6).map(|id| sample_entity(id, EntityKind::Poi, 0.0, 0.001 * id as f64)));
    entities.push(sample_entity(7, EntityKind::ChargingPoint, 0.0, 0.0005));
    let store = Arc::new(InMemoryEntityStore::with_entities(entities));
    World {
        cache: CacheStore::new(store.clone()),
        store,
        clock: Arc::new(MutableClock::new(start())),
        origin,
    }
}

#[fixture]
fn config() -> NearbyConfig {
    NearbyConfig {
        api_key: ApiKey::new("test-key"),
        batch_size: 2,
        ..NearbyConfig::default()
    }
}

fn ids(payload: &CachePayload) -> Vec<i64> {
    payload.items.iter().map(|item| item.id.get()).collect()
}

#[rstest]
#[tokio::test]
async fn routes_candidates_in_batches(world: World, config: NearbyConfig) {
    let routing = Arc::new(ScriptedRoutingProvider::default());
    let outcome = world
        .job(routing.clone())
        .run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("job runs");

    assert_eq!(outcome, MatrixJobOutcome::Completed { items: 5 });
    let requests = routing.requests();
    assert_eq!(
        requests.iter().map(|r| r.destinations.len()).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert!(requests.iter().all(|r| r.api_key.is_some()));

    let payload = world.payload().await;
    assert_eq!(ids(&payload), vec![2, 3, 4, 5, 6]);
    assert!(!payload.partial);
    assert_eq!(payload.progress, Progress { done: 5, total: 5 });
    assert_eq!(payload.computed_at, Some(start()));
    assert!(payload.items.iter().all(|item| !item.direct_line
        && item.provider == ScriptedRoutingProvider::NAME
        && item.kind == EntityKind::Poi));
}

#[rstest]
#[tokio::test]
async fn result_limit_truncates_items(world: World, mut config: NearbyConfig) {
    config.result_limit = 3;
    world
        .job(Arc::new(ScriptedRoutingProvider::default()))
        .run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("job runs");

    assert_eq!(ids(&world.payload().await), vec![2, 3, 4]);
}

#[rstest]
#[tokio::test]
async fn missing_api_key_is_recorded_without_calling_provider(
    world: World,
    mut config: NearbyConfig,
) {
    config.api_key = None;
    let routing = Arc::new(ScriptedRoutingProvider::default());

    let outcome = world
        .job(routing.clone())
        .run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("job runs");

    assert_eq!(
        outcome,
        MatrixJobOutcome::ProviderFailed {
            class: ProviderErrorClass::MissingApiKey,
            retry_after_s: None
        }
    );
    assert!(routing.requests().is_empty());
    let payload = world.payload().await;
    assert_eq!(payload.error, Some(ProviderErrorClass::MissingApiKey));
    assert_eq!(payload.error_at, Some(start()));
    assert!(payload.computed_at.is_none());
}

#[rstest]
#[tokio::test]
async fn mid_run_failure_keeps_routed_batches(world: World, config: NearbyConfig) {
    let routing = Arc::new(ScriptedRoutingProvider::default());
    routing.succeed_next();
    routing.fail_next(RoutingProviderError::rate_limited("quota", Some(30)));

    let outcome = world
        .job(routing)
        .run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("job runs");

    assert_eq!(
        outcome,
        MatrixJobOutcome::ProviderFailed {
            class: ProviderErrorClass::RateLimited,
            retry_after_s: Some(30)
        }
    );
    let payload = world.payload().await;
    assert_eq!(ids(&payload), vec![2, 3]);
    assert!(payload.partial);
    assert_eq!(payload.progress, Progress { done: 2, total: 5 });
    assert_eq!(payload.computed_at, Some(start()));
    assert_eq!(payload.retry_after_s, Some(30));
}

#[rstest]
#[tokio::test]
async fn first_batch_failure_keeps_previous_items(world: World, config: NearbyConfig) {
    let routing = Arc::new(ScriptedRoutingProvider::default());
    let job = world.job(routing.clone());
    job.run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("first run");
    let before = world.payload().await;

    world.clock.advance_seconds(3_600);
    routing.fail_next(RoutingProviderError::upstream(502_u16, "bad gateway", None::<u64>));
    job.run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("second run");

    let after = world.payload().await;
    assert_eq!(after.items, before.items);
    assert_eq!(after.computed_at, before.computed_at);
    assert_eq!(after.error, Some(ProviderErrorClass::Other("http_502".to_owned())));
    assert_eq!(after.error_at, Some(start() + chrono::Duration::seconds(3_600)));
}

#[rstest]
#[tokio::test]
async fn server_error_backoff_holds_off_refreshes(world: World, config: NearbyConfig) {
    let routing = Arc::new(ScriptedRoutingProvider::default());
    let job = world.job(routing.clone());
    routing.fail_next(RoutingProviderError::upstream(503_u16, "maintenance", 60_u64));
    job.run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("failed run");

    let payload = world.payload().await;
    assert_eq!(payload.error, Some(ProviderErrorClass::Other("http_503".to_owned())));
    assert_eq!(payload.retry_after_s, Some(60));

    let ttl = chrono::Duration::zero();
    let during = should_refresh_now(Some(&payload), start() + chrono::Duration::seconds(30), ttl);
    assert!(!during.refresh && !during.stale);
    assert_eq!(during.next_retry_at, Some(start() + chrono::Duration::seconds(60)));

    let after = should_refresh_now(Some(&payload), start() + chrono::Duration::seconds(61), ttl);
    assert!(after.refresh);
}

#[rstest]
#[tokio::test]
async fn successful_run_clears_previous_error(world: World, config: NearbyConfig) {
    let routing = Arc::new(ScriptedRoutingProvider::default());
    let job = world.job(routing.clone());
    routing.fail_next(RoutingProviderError::timeout("10s", None::<u64>));
    job.run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("failed run");
    assert!(world.payload().await.error.is_some());

    job.run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("second run");
    let payload = world.payload().await;
    assert!(payload.error.is_none() && payload.error_at.is_none());
    assert_eq!(payload.items.len(), 5);
}

#[rstest]
#[tokio::test]
async fn unreachable_cells_are_skipped(world: World, mut config: NearbyConfig) {
    config.batch_size = 10;
    let mut routing = MockRoutingProvider::new();
    routing.expect_name().return_const("mock");
    routing.expect_matrix().times(1).returning(|request| {
        let mut cells: Vec<MatrixCell> = request
            .destinations
            .iter()
            .enumerate()
            .map(|(index, _)| MatrixCell {
                distance_m: Some(100.0 * (index + 1) as f64),
                duration_s: Some(80.0 * (index + 1) as f64),
            })
            .collect();
        cells[1] = MatrixCell::default();
        Ok(MatrixResponse { cells })
    });

    world
        .job(Arc::new(routing))
        .run(&world.origin, CacheSlot::NearbyPois, &config)
        .await
        .expect("job runs");

    let payload = world.payload().await;
    assert_eq!(ids(&payload), vec![2, 4, 5, 6]);
    assert_eq!(payload.progress, Progress { done: 5, total: 5 });
}

#[rstest]
#[tokio::test]
async fn origin_without_candidates_completes_empty(config: NearbyConfig) {
    let lonely = sample_entity(50, EntityKind::CampSpot, 40.0, 40.0);
    let store = Arc::new(InMemoryEntityStore::with_entities([lonely.clone()]));
    let cache = CacheStore::new(store.clone());
    let job = MatrixJob::new(
        CandidateSelector::new(store),
        Arc::new(ScriptedRoutingProvider::default()),
        cache.clone(),
        Arc::new(MutableClock::new(start())),
    );

    let outcome = job
        .run(&lonely, CacheSlot::NearbyChargers, &config)
        .await
        .expect("job runs");

    assert_eq!(outcome, MatrixJobOutcome::Completed { items: 0 });
    let payload = cache
        .read(EntityId::new(50).expect("positive id"), CacheSlot::NearbyChargers)
        .await
        .expect("read")
        .expect("payload written");
    assert!(payload.items.is_empty());
    assert_eq!(payload.computed_at, Some(start()));
}
