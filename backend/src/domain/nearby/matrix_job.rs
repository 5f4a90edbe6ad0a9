//! Candidate selection and the batched routing matrix job.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, warn};

use super::cache_store::CacheStore;
use super::config::NearbyConfig;
use super::payload::{CachePayload, NearbyItem, Progress, ProviderErrorClass, rank_items};
use crate::domain::ports::{
    EntityStore, EntityStoreError, MatrixRequest, Neighbour, RadiusQuery, RoutingProvider,
    RoutingProviderError,
};
use crate::domain::{CacheSlot, Entity, EntityKind};

/// Finds target entities around an origin.
#[derive(Clone)]
pub struct CandidateSelector {
    store: Arc<dyn EntityStore>,
}

impl CandidateSelector {
    /// Build a selector over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Entities of `target` within the configured radius of `origin`, nearest
    /// first, excluding the origin and capped at `max_candidates`.
    pub async fn candidates(
        &self,
        origin: &Entity,
        target: EntityKind,
        config: &NearbyConfig,
    ) -> Result<Vec<Neighbour>, EntityStoreError> {
        let query = RadiusQuery {
            center: origin.coordinates,
            radius_m: f64::from(config.radius_m),
            kind: target,
            exclude: Some(origin.id),
            limit: Some(config.max_candidates as usize),
        };
        self.store.entities_within(&query).await
    }
}

/// Result of one matrix job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixJobOutcome {
    /// Every batch was routed.
    Completed {
        /// Items written to the cache.
        items: usize,
    },
    /// The provider failed; the error was recorded on the payload.
    ProviderFailed {
        /// Recorded class.
        class: ProviderErrorClass,
        /// Recorded backoff.
        retry_after_s: Option<u64>,
    },
}

/// Routes candidates in batches and writes the resulting payload.
#[derive(Clone)]
pub struct MatrixJob {
    selector: CandidateSelector,
    routing: Arc<dyn RoutingProvider>,
    cache: CacheStore,
    clock: Arc<dyn Clock>,
}

impl MatrixJob {
    /// Assemble a matrix job.
    pub fn new(
        selector: CandidateSelector,
        routing: Arc<dyn RoutingProvider>,
        cache: CacheStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            selector,
            routing,
            cache,
            clock,
        }
    }

    /// Recompute `slot` for `origin`.
    ///
    /// Provider failures are recorded on the payload and reported through
    /// [`MatrixJobOutcome::ProviderFailed`]; only store failures are errors.
    pub async fn run(
        &self,
        origin: &Entity,
        slot: CacheSlot,
        config: &NearbyConfig,
    ) -> Result<MatrixJobOutcome, EntityStoreError> {
        let previous = self.cache.read(origin.id, slot).await?.unwrap_or_default();

        let Some(api_key) = config.api_key.clone() else {
            return self
                .record_failure(origin, slot, previous, &RoutingProviderError::missing_api_key())
                .await;
        };

        let candidates = self
            .selector
            .candidates(origin, slot.target_kind(), config)
            .await?;
        let total = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
        let limit = config.result_limit as usize;
        let batch_size = config.batch_size.max(1) as usize;
        let mut collected: Vec<NearbyItem> = Vec::with_capacity(candidates.len());
        let mut done: u32 = 0;

        for batch in candidates.chunks(batch_size) {
            let request = MatrixRequest {
                origin: origin.coordinates,
                destinations: batch.iter().map(|n| n.entity.coordinates).collect(),
                profile: config.profile.clone(),
                api_key: Some(api_key.clone()),
            };
            let response = match self.routing.matrix(&request).await {
                Ok(response) => response,
                Err(error) => {
                    let base = if collected.is_empty() {
                        previous
                    } else {
                        CachePayload {
                            items: rank_items(collected, limit),
                            computed_at: Some(self.clock.utc()),
                            partial: done < total,
                            progress: Progress { done, total },
                            ..previous
                        }
                    };
                    return self.record_failure(origin, slot, base, &error).await;
                }
            };

            for (neighbour, cell) in batch.iter().zip(response.cells.iter()) {
                let Some((distance_m, duration_s)) = cell.routed() else {
                    continue;
                };
                collected.push(NearbyItem {
                    id: neighbour.entity.id,
                    kind: neighbour.entity.kind,
                    distance_m,
                    duration_s,
                    provider: self.routing.name().to_owned(),
                    profile: config.profile.clone(),
                    direct_line: false,
                });
            }
            done = done.saturating_add(u32::try_from(batch.len()).unwrap_or(u32::MAX));

            if done < total {
                let progress = CachePayload {
                    items: rank_items(collected.iter().cloned(), limit),
                    computed_at: Some(self.clock.utc()),
                    partial: true,
                    progress: Progress { done, total },
                    ..previous.clone()
                };
                self.cache
                    .write(origin.id, slot, &progress, self.clock.utc())
                    .await?;
                debug!(origin = %origin.id, %slot, done, total, "matrix batch stored");
            }
        }

        let items = rank_items(collected, limit);
        let count = items.len();
        let finished = CachePayload {
            items,
            computed_at: Some(self.clock.utc()),
            partial: false,
            progress: Progress { done: total, total },
            error: None,
            error_at: None,
            retry_after_s: None,
        };
        self.cache
            .write(origin.id, slot, &finished, self.clock.utc())
            .await?;
        Ok(MatrixJobOutcome::Completed { items: count })
    }

    async fn record_failure(
        &self,
        origin: &Entity,
        slot: CacheSlot,
        mut payload: CachePayload,
        error: &RoutingProviderError,
    ) -> Result<MatrixJobOutcome, EntityStoreError> {
        let class = ProviderErrorClass::from(error);
        let retry_after_s = error.retry_after_s();
        let now = self.clock.utc();
        warn!(origin = %origin.id, %slot, %class, %error, "routing provider failed");

        payload.partial = payload.partial && payload.progress.done < payload.progress.total;
        payload.record_error(class.clone(), now, retry_after_s);
        self.cache.write(origin.id, slot, &payload, now).await?;
        Ok(MatrixJobOutcome::ProviderFailed {
            class,
            retry_after_s,
        })
    }
}

#[cfg(test)]
mod tests;
