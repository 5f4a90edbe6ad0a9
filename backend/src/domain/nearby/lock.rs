//! Single-flight recompute lock with expiry.
//!
//! The lock is an attribute on the origin entity whose write time doubles as
//! the acquisition time. A lock older than the configured TTL belongs to a
//! worker that died mid-run and may be taken over.
//!
//! [`SingleFlightLock::run_exclusive`] also covers cancellation: when the
//! holding future is dropped (client disconnect, worker abort) a drop guard
//! hands the release to the current tokio runtime.

use std::future::Future;
use std::ops::RangeInclusive;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::FutureExt;
use mockable::Clock;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::domain::ports::{EntityStore, EntityStoreError};
use crate::domain::{CacheSlot, EntityId};

/// Default age after which a lock is considered abandoned.
pub const DEFAULT_LOCK_TTL_S: i64 = 600;

/// Accepted lock TTLs in seconds. Longer values are capped to one day.
pub const LOCK_TTL_RANGE_S: RangeInclusive<i64> = 1..=86_400;

/// Per-origin, per-slot recompute lock.
#[derive(Clone)]
pub struct SingleFlightLock {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SingleFlightLock {
    /// Build a lock whose holders expire after `ttl`, clamped to
    /// [`LOCK_TTL_RANGE_S`].
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: clamp_ttl(ttl),
        }
    }

    fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Try to take the lock. Returns `false` when a live lock exists.
    pub async fn try_acquire(&self, origin: EntityId, slot: CacheSlot) -> Result<bool, EntityStoreError> {
        let now = self.clock.utc();
        let stale_before = self.stale_before(now);
        self.store
            .insert_attribute_unless_fresh(
                origin,
                slot.lock_key(),
                &json!({ "acquiredAt": now }),
                now,
                stale_before,
            )
            .await
    }

    /// Drop the lock.
    pub async fn release(&self, origin: EntityId, slot: CacheSlot) -> Result<(), EntityStoreError> {
        self.store.delete_attribute(origin, slot.lock_key()).await.map(|_| ())
    }

    /// Whether a live (unexpired) lock exists.
    pub async fn is_held(&self, origin: EntityId, slot: CacheSlot) -> Result<bool, EntityStoreError> {
        let stale_before = self.stale_before(self.clock.utc());
        Ok(self
            .store
            .read_attribute(origin, slot.lock_key())
            .await?
            .is_some_and(|lock| lock.updated_at >= stale_before))
    }

    /// Run `work` while holding the lock.
    ///
    /// Returns `Ok(None)` without running `work` when the lock is taken. The
    /// lock is released on every exit path: completion, error, panic (resumed
    /// after the release) and cancellation of the returned future.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        origin: EntityId,
        slot: CacheSlot,
        work: F,
    ) -> Result<Option<T>, EntityStoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.try_acquire(origin, slot).await? {
            debug!(%origin, %slot, "recompute already in flight");
            return Ok(None);
        }

        let guard = ReleaseOnDrop::new(self.clone(), origin, slot);
        let outcome = AssertUnwindSafe(work()).catch_unwind().await;
        if let Err(error) = self.release(origin, slot).await {
            warn!(%origin, %slot, %error, "failed to release recompute lock");
        }
        guard.disarm();
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Clamp `ttl` to whole seconds within [`LOCK_TTL_RANGE_S`].
pub fn clamp_ttl(ttl: Duration) -> Duration {
    let secs = ttl
        .num_seconds()
        .clamp(*LOCK_TTL_RANGE_S.start(), *LOCK_TTL_RANGE_S.end());
    Duration::seconds(secs)
}

/// Releases a held lock when dropped while still armed.
///
/// Drop cannot await, so the release is spawned on the runtime in scope.
/// Outside a runtime the lock is left to expire through the TTL.
struct ReleaseOnDrop {
    lock: SingleFlightLock,
    origin: EntityId,
    slot: CacheSlot,
    armed: bool,
}

impl ReleaseOnDrop {
    fn new(lock: SingleFlightLock, origin: EntityId, slot: CacheSlot) -> Self {
        Self {
            lock,
            origin,
            slot,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (origin, slot) = (self.origin, self.slot);
        let Ok(handle) = Handle::try_current() else {
            warn!(%origin, %slot, "recompute cancelled outside a runtime; lock left to expire");
            return;
        };
        debug!(%origin, %slot, "recompute cancelled; releasing lock");
        let lock = self.lock.clone();
        handle.spawn(async move {
            if let Err(error) = lock.release(origin, slot).await {
                warn!(%origin, %slot, %error, "failed to release cancelled recompute lock");
            }
        });
    }
}
