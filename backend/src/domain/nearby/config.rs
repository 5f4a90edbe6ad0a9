//! Process-wide nearby configuration with clamped partial updates.
//!
//! Use sites take an immutable [`NearbyConfig`] snapshot per operation so a
//! concurrent update never changes values halfway through a recompute.

use std::ops::RangeInclusive;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::domain::Error;
use crate::domain::ports::ApiKey;

/// Allowed search radius in metres.
pub const RADIUS_RANGE_M: RangeInclusive<u32> = 100..=50_000;
/// Allowed candidate count per recompute.
pub const MAX_CANDIDATES_RANGE: RangeInclusive<u32> = 1..=100;
/// Allowed destinations per matrix call.
pub const BATCH_SIZE_RANGE: RangeInclusive<u32> = 1..=50;
/// Allowed number of cached items and read limit.
pub const RESULT_LIMIT_RANGE: RangeInclusive<u32> = 1..=50;
/// Allowed cache TTL in seconds (up to 365 days).
pub const TTL_RANGE_S: RangeInclusive<u64> = 0..=365 * 24 * 60 * 60;
/// Allowed walking speed in metres per second.
pub const SPEED_RANGE_MPS: RangeInclusive<f64> = 0.1..=10.0;

/// Effective nearby configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyConfig {
    /// Routing provider credential.
    pub api_key: Option<ApiKey>,
    /// Movement profile sent to the provider.
    pub profile: String,
    /// Search radius in metres.
    pub radius_m: u32,
    /// Maximum candidates routed per recompute.
    pub max_candidates: u32,
    /// Destinations per matrix call.
    pub batch_size: u32,
    /// Items kept in each cached list.
    pub result_limit: u32,
    /// Cache time-to-live in seconds.
    pub ttl_s: u64,
    /// Assumed walking speed for direct-line estimates.
    pub walking_speed_mps: f64,
    /// Whether stale reads enqueue a refresh.
    pub auto_refresh: bool,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            profile: "foot-walking".to_owned(),
            radius_m: 1_500,
            max_candidates: 20,
            batch_size: 10,
            result_limit: 10,
            ttl_s: 7 * 24 * 60 * 60,
            walking_speed_mps: 1.33,
            auto_refresh: true,
        }
    }
}

impl NearbyConfig {
    /// Cache TTL as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        i64::try_from(self.ttl_s)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Clamp every numeric field into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.radius_m = clamp(self.radius_m, &RADIUS_RANGE_M);
        self.max_candidates = clamp(self.max_candidates, &MAX_CANDIDATES_RANGE);
        self.batch_size = clamp(self.batch_size, &BATCH_SIZE_RANGE);
        self.result_limit = clamp(self.result_limit, &RESULT_LIMIT_RANGE);
        self.ttl_s = clamp(self.ttl_s, &TTL_RANGE_S);
        self.walking_speed_mps = if self.walking_speed_mps.is_finite() {
            self.walking_speed_mps
                .clamp(*SPEED_RANGE_MPS.start(), *SPEED_RANGE_MPS.end())
        } else {
            NearbyConfig::default().walking_speed_mps
        };
        self
    }

    /// Apply a partial update; unset fields keep their current value.
    pub fn apply(mut self, update: NearbyConfigUpdate) -> Result<Self, ConfigUpdateError> {
        if let Some(profile) = update.profile {
            let profile = profile.trim();
            if profile.is_empty() {
                return Err(ConfigUpdateError::BlankProfile);
            }
            self.profile = profile.to_owned();
        }
        if let Some(speed) = update.walking_speed_mps {
            if !speed.is_finite() {
                return Err(ConfigUpdateError::NonFiniteSpeed);
            }
            self.walking_speed_mps = speed;
        }
        if let Some(raw) = update.api_key {
            self.api_key = ApiKey::new(raw);
        }
        self.radius_m = update.radius_m.unwrap_or(self.radius_m);
        self.max_candidates = update.max_candidates.unwrap_or(self.max_candidates);
        self.batch_size = update.batch_size.unwrap_or(self.batch_size);
        self.result_limit = update.result_limit.unwrap_or(self.result_limit);
        self.ttl_s = update.ttl_s.unwrap_or(self.ttl_s);
        self.auto_refresh = update.auto_refresh.unwrap_or(self.auto_refresh);
        Ok(self.clamped())
    }

    /// Clamp a caller-supplied read limit; `None` means the result limit.
    pub fn read_limit(&self, requested: Option<u32>) -> usize {
        clamp(requested.unwrap_or(self.result_limit), &RESULT_LIMIT_RANGE) as usize
    }
}

fn clamp<T: PartialOrd + Copy>(value: T, range: &RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}

/// Partial configuration update.
///
/// `api_key: Some("")` clears the stored key; `None` keeps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearbyConfigUpdate {
    /// New credential, or blank to clear.
    pub api_key: Option<String>,
    /// Movement profile.
    pub profile: Option<String>,
    /// Search radius in metres.
    pub radius_m: Option<u32>,
    /// Maximum candidates per recompute.
    pub max_candidates: Option<u32>,
    /// Destinations per matrix call.
    pub batch_size: Option<u32>,
    /// Items kept per cached list.
    pub result_limit: Option<u32>,
    /// Cache TTL in seconds.
    pub ttl_s: Option<u64>,
    /// Walking speed in metres per second.
    pub walking_speed_mps: Option<f64>,
    /// Auto-refresh on stale reads.
    pub auto_refresh: Option<bool>,
}

/// Update values that cannot be clamped into range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigUpdateError {
    /// Profile was empty after trimming.
    #[error("profile must not be blank")]
    BlankProfile,
    /// Walking speed was NaN or infinite.
    #[error("walkingSpeedMps must be a finite number")]
    NonFiniteSpeed,
}

impl From<ConfigUpdateError> for Error {
    fn from(err: ConfigUpdateError) -> Self {
        Error::invalid_request(err.to_string())
    }
}

/// Shared holder of the live configuration.
#[derive(Debug)]
pub struct NearbyConfigStore {
    current: RwLock<Arc<NearbyConfig>>,
}

impl NearbyConfigStore {
    /// Store `initial` after clamping it.
    pub fn new(initial: NearbyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial.clamped())),
        }
    }

    /// Immutable snapshot of the current configuration.
    pub fn snapshot(&self) -> Arc<NearbyConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `update` atomically and return the new snapshot.
    pub fn update(&self, update: NearbyConfigUpdate) -> Result<Arc<NearbyConfig>, ConfigUpdateError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(NearbyConfig::clone(&guard).apply(update)?);
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> NearbyConfigStore {
        NearbyConfigStore::new(NearbyConfig::default())
    }

    #[rstest]
    fn update_clamps_out_of_range_values(store: NearbyConfigStore) {
        let next = store
            .update(NearbyConfigUpdate {
                radius_m: Some(5),
                max_candidates: Some(1_000),
                batch_size: Some(0),
                result_limit: Some(500),
                ttl_s: Some(u64::MAX),
                walking_speed_mps: Some(42.0),
                ..NearbyConfigUpdate::default()
            })
            .expect("update applies");

        assert_eq!(next.radius_m, 100);
        assert_eq!(next.max_candidates, 100);
        assert_eq!(next.batch_size, 1);
        assert_eq!(next.result_limit, 50);
        assert_eq!(next.ttl_s, *TTL_RANGE_S.end());
        assert!((next.walking_speed_mps - 10.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn partial_update_keeps_unset_fields(store: NearbyConfigStore) {
        let before = store.snapshot();
        let next = store
            .update(NearbyConfigUpdate {
                auto_refresh: Some(false),
                ..NearbyConfigUpdate::default()
            })
            .expect("update applies");

        assert!(!next.auto_refresh);
        assert_eq!(next.radius_m, before.radius_m);
        assert_eq!(next.profile, before.profile);
    }

    #[rstest]
    fn blank_api_key_clears_credential(store: NearbyConfigStore) {
        store
            .update(NearbyConfigUpdate {
                api_key: Some("key-1".to_owned()),
                ..NearbyConfigUpdate::default()
            })
            .expect("update applies");
        assert!(store.snapshot().api_key.is_some());

        store
            .update(NearbyConfigUpdate {
                api_key: Some("   ".to_owned()),
                ..NearbyConfigUpdate::default()
            })
            .expect("update applies");
        assert!(store.snapshot().api_key.is_none());
    }

    #[rstest]
    #[case(NearbyConfigUpdate { profile: Some(" ".to_owned()), ..NearbyConfigUpdate::default() }, ConfigUpdateError::BlankProfile)]
    #[case(NearbyConfigUpdate { walking_speed_mps: Some(f64::NAN), ..NearbyConfigUpdate::default() }, ConfigUpdateError::NonFiniteSpeed)]
    fn invalid_updates_leave_config_untouched(
        store: NearbyConfigStore,
        #[case] update: NearbyConfigUpdate,
        #[case] expected: ConfigUpdateError,
    ) {
        let before = store.snapshot();
        assert_eq!(store.update(update), Err(expected));
        assert_eq!(store.snapshot(), before);
    }

    #[rstest]
    #[case(None, 10)]
    #[case(Some(0), 1)]
    #[case(Some(25), 25)]
    #[case(Some(500), 50)]
    fn read_limit_is_bounded(#[case] requested: Option<u32>, #[case] expected: usize) {
        assert_eq!(NearbyConfig::default().read_limit(requested), expected);
    }
}
