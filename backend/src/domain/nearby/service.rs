//! Read/enrichment façade and operator commands for nearby lists.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use mockable::Clock;
use tracing::{debug, info};

use super::cache_store::CacheStore;
use super::config::{NearbyConfig, NearbyConfigStore, NearbyConfigUpdate};
use super::dispatcher::{DispatchOutcome, RecomputeDispatcher};
use super::geo::estimate;
use super::lock::SingleFlightLock;
use super::matrix_job::CandidateSelector;
use super::payload::{
    CachePayload, ESTIMATOR_PROVIDER, NearbyItem, Progress, ProviderErrorClass, rank_items,
};
use super::policy::should_refresh_now;
use super::worker::{RecomputeRun, RecomputeWorker};
use crate::domain::ports::{
    EntityStore, JobPriority, MatrixRequest, RecomputeJob, RoutingProvider, RoutingProviderError,
};
use crate::domain::{CacheSlot, Coordinates, Entity, EntityId, EntityKind, Error};

/// Read request for one origin's nearby list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearbyQuery {
    /// Origin entity.
    pub origin: EntityId,
    /// Target kind; defaults to the origin's first nearby kind.
    pub kind: Option<EntityKind>,
    /// Requested item count, clamped to the allowed range.
    pub limit: Option<u32>,
}

/// Cached or estimated item merged with the target's live entity data.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedItem {
    /// Distance and duration from the origin.
    pub item: NearbyItem,
    /// Current target entity.
    pub entity: Entity,
}

/// Response of [`NearbyService::get`].
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyView {
    /// Origin entity.
    pub origin: EntityId,
    /// Slot that was read.
    pub slot: CacheSlot,
    /// Items, nearest first.
    pub items: Vec<EnrichedItem>,
    /// Whether the list is past its TTL and eligible for refresh.
    pub stale: bool,
    /// Whether a multi-batch computation is incomplete.
    pub partial: bool,
    /// Whether a recompute currently holds the lock.
    pub running: bool,
    /// Candidates processed by the last computation.
    pub progress: Progress,
    /// Time of the last successful computation.
    pub computed_at: Option<DateTime<Utc>>,
    /// Last provider failure class.
    pub error: Option<ProviderErrorClass>,
    /// When `error` was recorded.
    pub error_at: Option<DateTime<Utc>>,
    /// Backoff recorded with `error`.
    pub retry_after_s: Option<u64>,
    /// Earliest refresh attempt while cooling down.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Dispatch triggered by this read, if any.
    pub refresh: Option<DispatchOutcome>,
}

/// Result of a recompute request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeReport {
    /// Ran inline.
    Ran(RecomputeRun),
    /// Handed to the dispatcher.
    Dispatched(DispatchOutcome),
}

/// Outcome of a provider connectivity check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCheck {
    /// Whether the check succeeded.
    pub ok: bool,
    /// Provider identifier.
    pub provider: String,
    /// HTTP status observed, when any.
    pub status: Option<u16>,
    /// Failure class.
    pub error: Option<ProviderErrorClass>,
    /// Provider error message.
    pub message: Option<String>,
    /// Suggested backoff.
    pub retry_after_s: Option<u64>,
    /// Round-trip time of the check in milliseconds.
    pub latency_ms: u64,
}

/// Origin used by [`NearbyService::check_provider`].
const CHECK_ORIGIN: (f64, f64) = (52.520_0, 13.405_0);
/// Check destination roughly 300 m east of the origin.
const CHECK_DESTINATION: (f64, f64) = (52.520_6, 13.409_4);

/// Dependencies required by [`NearbyService`].
pub struct NearbyServicePorts {
    /// Entity and attribute storage.
    pub store: Arc<dyn EntityStore>,
    /// Routing provider used by the connectivity check.
    pub routing: Arc<dyn RoutingProvider>,
    /// Async dispatch chain.
    pub dispatcher: Arc<RecomputeDispatcher>,
    /// Inline recompute driver.
    pub worker: Arc<RecomputeWorker>,
    /// Lock used to report `running`.
    pub lock: SingleFlightLock,
    /// Live configuration.
    pub config: Arc<NearbyConfigStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Externally facing nearby operations.
pub struct NearbyService {
    store: Arc<dyn EntityStore>,
    cache: CacheStore,
    selector: CandidateSelector,
    routing: Arc<dyn RoutingProvider>,
    dispatcher: Arc<RecomputeDispatcher>,
    worker: Arc<RecomputeWorker>,
    lock: SingleFlightLock,
    config: Arc<NearbyConfigStore>,
    clock: Arc<dyn Clock>,
}

impl NearbyService {
    /// Build the façade.
    pub fn new(ports: NearbyServicePorts) -> Self {
        Self {
            cache: CacheStore::new(ports.store.clone()),
            selector: CandidateSelector::new(ports.store.clone()),
            store: ports.store,
            routing: ports.routing,
            dispatcher: ports.dispatcher,
            worker: ports.worker,
            lock: ports.lock,
            config: ports.config,
            clock: ports.clock,
        }
    }

    /// Read a nearby list, triggering a background refresh when stale.
    ///
    /// Without a cached list the response is a direct-line estimate so the
    /// caller never gets an empty result while candidates exist.
    pub async fn get(&self, query: NearbyQuery) -> Result<NearbyView, Error> {
        let config = self.config.snapshot();
        let origin = self.load_origin(query.origin).await?;
        let slot = resolve_slot(&origin, query.kind)?;
        let limit = config.read_limit(query.limit);

        let payload = self.cache.read(origin.id, slot).await?;
        let decision = should_refresh_now(payload.as_ref(), self.clock.utc(), config.ttl());
        let running = self.lock.is_held(origin.id, slot).await?;

        let refresh = if config.auto_refresh && decision.stale && !running {
            let job = RecomputeJob::new(origin.id, slot, JobPriority::High);
            Some(self.dispatcher.enqueue(job).await)
        } else {
            None
        };

        let CachePayload {
            items,
            partial,
            progress,
            computed_at,
            error,
            error_at,
            retry_after_s,
        } = payload.unwrap_or_default();
        let mut items = if items.is_empty() {
            self.estimate_items(&origin, slot, &config).await?
        } else {
            items
        };
        items.truncate(limit);

        Ok(NearbyView {
            origin: origin.id,
            slot,
            items: self.enrich(items).await?,
            stale: decision.stale,
            partial,
            running,
            progress,
            computed_at,
            error,
            error_at,
            retry_after_s,
            next_retry_at: decision.next_retry_at,
            refresh,
        })
    }

    /// Recompute a list inline (`sync`) or through the dispatcher.
    pub async fn recompute(
        &self,
        origin: EntityId,
        kind: Option<EntityKind>,
        sync: bool,
    ) -> Result<RecomputeReport, Error> {
        let entity = self.load_origin(origin).await?;
        let slot = resolve_slot(&entity, kind)?;
        if sync {
            let run = self.worker.run(origin, slot).await?;
            return Ok(RecomputeReport::Ran(run));
        }
        let outcome = self
            .dispatcher
            .enqueue(RecomputeJob::new(origin, slot, JobPriority::High))
            .await;
        Ok(RecomputeReport::Dispatched(outcome))
    }

    /// Delete every cached payload.
    pub async fn clear_cache(&self) -> Result<u64, Error> {
        let removed = self.cache.clear_all().await?;
        info!(removed, "cleared nearby cache");
        Ok(removed)
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<NearbyConfig> {
        self.config.snapshot()
    }

    /// Name of the routing provider recomputes call.
    pub fn provider_name(&self) -> &str {
        self.routing.name()
    }

    /// Apply a partial configuration update.
    pub fn update_config(&self, update: NearbyConfigUpdate) -> Result<Arc<NearbyConfig>, Error> {
        let next = self.config.update(update)?;
        info!(
            radius_m = next.radius_m,
            ttl_s = next.ttl_s,
            auto_refresh = next.auto_refresh,
            "nearby configuration updated"
        );
        Ok(next)
    }

    /// Send one small matrix request and report what the provider said.
    ///
    /// The check never touches cached payloads.
    pub async fn check_provider(&self) -> Result<ProviderCheck, Error> {
        let config = self.config.snapshot();
        let origin = check_point(CHECK_ORIGIN)?;
        let destination = check_point(CHECK_DESTINATION)?;
        let started = Instant::now();
        let result = match config.api_key.clone() {
            None => Err(RoutingProviderError::missing_api_key()),
            Some(api_key) => {
                let request = MatrixRequest {
                    origin,
                    destinations: vec![destination],
                    profile: config.profile.clone(),
                    api_key: Some(api_key),
                };
                self.routing.matrix(&request).await
            }
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let provider = self.routing.name().to_owned();

        Ok(match result {
            Ok(_) => ProviderCheck {
                ok: true,
                provider,
                status: Some(200),
                error: None,
                message: None,
                retry_after_s: None,
                latency_ms,
            },
            Err(error) => ProviderCheck {
                ok: false,
                provider,
                status: error.status(),
                error: Some(ProviderErrorClass::from(&error)),
                message: Some(error.to_string()),
                retry_after_s: error.retry_after_s(),
                latency_ms,
            },
        })
    }

    async fn load_origin(&self, id: EntityId) -> Result<Entity, Error> {
        self.store
            .find_entity(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("entity {id} not found")))
    }

    async fn estimate_items(
        &self,
        origin: &Entity,
        slot: CacheSlot,
        config: &NearbyConfig,
    ) -> Result<Vec<NearbyItem>, Error> {
        let candidates = self
            .selector
            .candidates(origin, slot.target_kind(), config)
            .await?;
        let estimated = candidates.into_iter().map(|neighbour| {
            let guess = estimate(
                origin.coordinates,
                neighbour.entity.coordinates,
                config.walking_speed_mps,
            );
            NearbyItem {
                id: neighbour.entity.id,
                kind: neighbour.entity.kind,
                distance_m: guess.distance_m,
                duration_s: guess.duration_s,
                provider: ESTIMATOR_PROVIDER.to_owned(),
                profile: config.profile.clone(),
                direct_line: true,
            }
        });
        Ok(rank_items(estimated, config.max_candidates as usize))
    }

    async fn enrich(&self, items: Vec<NearbyItem>) -> Result<Vec<EnrichedItem>, Error> {
        let lookups = join_all(items.iter().map(|item| self.store.find_entity(item.id))).await;
        let mut enriched = Vec::with_capacity(items.len());
        for (item, lookup) in items.into_iter().zip(lookups) {
            match lookup? {
                Some(entity) => enriched.push(EnrichedItem { item, entity }),
                None => debug!(target_id = %item.id, "dropping cached item for missing entity"),
            }
        }
        Ok(enriched)
    }
}

fn resolve_slot(origin: &Entity, kind: Option<EntityKind>) -> Result<CacheSlot, Error> {
    let target = match kind {
        Some(kind) => kind,
        None => *origin.kind.nearby_targets().first().ok_or_else(|| {
            Error::invalid_request(format!("{} entities keep no nearby list", origin.kind))
        })?,
    };
    CacheSlot::resolve(origin.kind, target).ok_or_else(|| {
        Error::invalid_request(format!(
            "{} entities do not list nearby {target} entities",
            origin.kind
        ))
        .with_details(serde_json::json!({
            "field": "kind",
            "allowed": origin.kind.nearby_targets(),
        }))
    })
}

fn check_point((lat, lng): (f64, f64)) -> Result<Coordinates, Error> {
    Coordinates::new(lat, lng).map_err(|err| Error::internal(err.to_string()))
}
