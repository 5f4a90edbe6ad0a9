//! Change-triggered invalidation of nearby lists.
//!
//! Saving or deleting an entity affects two sets of cached lists: the
//! entity's own lists, and the lists of every neighbour that could have
//! contained it (or could contain it now). Reverse lookups only visit kinds
//! that list the mutated kind, around both the old and the new position.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache_store::CacheStore;
use super::config::NearbyConfigStore;
use super::dispatcher::{DispatchOutcome, RecomputeDispatcher};
use crate::domain::ports::{EntityStore, JobPriority, RadiusQuery, RecomputeJob};
use crate::domain::{CacheSlot, Coordinates, Entity, EntityId, EntityKind};

/// Counters describing one propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagationReport {
    /// Jobs accepted by a backend.
    pub queued: usize,
    /// Jobs skipped because one was already waiting.
    pub already_pending: usize,
    /// Jobs no backend accepted.
    pub dropped: usize,
    /// Own cache payloads removed, directly or with the deleted entity.
    pub cleared: usize,
    /// Distinct neighbours whose lists were invalidated.
    pub neighbours: usize,
    /// Radius lookups or clears that failed and were skipped.
    pub failures: usize,
}

impl PropagationReport {
    fn count(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Queued { .. } => self.queued += 1,
            DispatchOutcome::AlreadyPending => self.already_pending += 1,
            DispatchOutcome::Dropped => self.dropped += 1,
        }
    }
}

/// Enqueues recomputes for lists affected by an entity mutation.
pub struct InvalidationPropagator {
    store: Arc<dyn EntityStore>,
    cache: CacheStore,
    dispatcher: Arc<RecomputeDispatcher>,
    config: Arc<NearbyConfigStore>,
}

impl InvalidationPropagator {
    /// Build a propagator.
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: CacheStore,
        dispatcher: Arc<RecomputeDispatcher>,
        config: Arc<NearbyConfigStore>,
    ) -> Self {
        Self {
            store,
            cache,
            dispatcher,
            config,
        }
    }

    /// React to `entity` being created or updated from `previous`.
    pub async fn on_saved(&self, entity: &Entity, previous: Option<&Entity>) -> PropagationReport {
        let mut report = PropagationReport::default();

        if let Some(previous) = previous.filter(|previous| previous.kind != entity.kind) {
            let current: Vec<CacheSlot> = CacheSlot::for_origin(entity.kind).collect();
            for slot in CacheSlot::for_origin(previous.kind).filter(|slot| !current.contains(slot)) {
                self.clear_own(entity.id, slot, &mut report).await;
            }
        }

        for slot in CacheSlot::for_origin(entity.kind) {
            let outcome = self
                .dispatcher
                .enqueue(RecomputeJob::new(entity.id, slot, JobPriority::Normal))
                .await;
            report.count(outcome);
        }

        let mut sightings = vec![(entity.kind, entity.coordinates)];
        if let Some(previous) = previous {
            let moved = previous.coordinates != entity.coordinates;
            if moved || previous.kind != entity.kind {
                sightings.push((previous.kind, previous.coordinates));
            }
        }
        self.invalidate_neighbours(entity.id, &sightings, &mut report).await;

        info!(entity = %entity.id, kind = %entity.kind, ?report, "propagated entity save");
        report
    }

    /// Count the payloads cached for `entity`'s own lists without touching
    /// them.
    ///
    /// Deleting the entity removes its attributes, so the count taken here
    /// is what the delete clears.
    pub async fn count_lists(&self, entity: &Entity) -> PropagationReport {
        let mut report = PropagationReport::default();
        for slot in CacheSlot::for_origin(entity.kind) {
            match self.store.read_attribute(entity.id, slot.payload_key()).await {
                Ok(Some(_)) => report.cleared += 1,
                Ok(None) => {}
                Err(error) => {
                    report.failures += 1;
                    warn!(entity = %entity.id, %slot, %error, "failed to read nearby payload");
                }
            }
        }
        report
    }

    /// React to `entity` having been deleted, extending the report from
    /// [`Self::count_lists`].
    pub async fn on_deleted(
        &self,
        entity: &Entity,
        mut report: PropagationReport,
    ) -> PropagationReport {
        self.invalidate_neighbours(entity.id, &[(entity.kind, entity.coordinates)], &mut report)
            .await;

        info!(entity = %entity.id, kind = %entity.kind, ?report, "propagated entity delete");
        report
    }

    async fn clear_own(&self, id: EntityId, slot: CacheSlot, report: &mut PropagationReport) {
        match self.cache.clear(id, slot).await {
            Ok(true) => report.cleared += 1,
            Ok(false) => {}
            Err(error) => {
                report.failures += 1;
                warn!(entity = %id, %slot, %error, "failed to clear nearby payload");
            }
        }
    }

    async fn invalidate_neighbours(
        &self,
        id: EntityId,
        sightings: &[(EntityKind, Coordinates)],
        report: &mut PropagationReport,
    ) {
        let radius_m = f64::from(self.config.snapshot().radius_m);
        let mut affected: BTreeSet<(EntityId, CacheSlot)> = BTreeSet::new();

        for (kind, position) in sightings {
            let Some(slot) = CacheSlot::for_target(*kind) else {
                continue;
            };
            for neighbour_kind in kind.listed_by() {
                let query = RadiusQuery {
                    center: *position,
                    radius_m,
                    kind: neighbour_kind,
                    exclude: Some(id),
                    limit: None,
                };
                match self.store.entities_within(&query).await {
                    Ok(found) => {
                        affected.extend(found.into_iter().map(|n| (n.entity.id, slot)));
                    }
                    Err(error) => {
                        report.failures += 1;
                        warn!(
                            entity = %id,
                            kind = %neighbour_kind,
                            %error,
                            "neighbour lookup failed"
                        );
                    }
                }
            }
        }

        report.neighbours = affected
            .iter()
            .map(|(neighbour, _)| *neighbour)
            .collect::<BTreeSet<_>>()
            .len();
        debug!(entity = %id, neighbours = report.neighbours, "invalidating neighbour lists");
        for (neighbour, slot) in affected {
            let outcome = self
                .dispatcher
                .enqueue(RecomputeJob::new(neighbour, slot, JobPriority::Normal))
                .await;
            report.count(outcome);
        }
    }
}
