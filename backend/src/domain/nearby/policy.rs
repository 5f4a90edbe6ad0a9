//! Staleness and error-cooldown policy for cached nearby lists.
//!
//! Without a cooldown every read of a stale list would re-trigger a refresh
//! against a provider that just failed. The cooldown window depends on the
//! error class: credential problems wait much longer than rate limits.

use chrono::{DateTime, Duration, Utc};

use super::payload::{CachePayload, ProviderErrorClass};

/// Cooldown after `rate_limited` when the provider gave no hint, in seconds.
pub const RATE_LIMIT_COOLDOWN_S: i64 = 120;
/// Cooldown after `unauthorized` or `missing_api_key`, in seconds.
pub const CREDENTIAL_COOLDOWN_S: i64 = 6 * 60 * 60;

/// Outcome of [`should_refresh_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshDecision {
    /// Whether a refresh should be triggered now.
    pub refresh: bool,
    /// Whether the list is reported as stale to the caller.
    pub stale: bool,
    /// Earliest time a refresh will be attempted, while cooling down.
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Cooldown window applying to the payload's recorded error.
///
/// An explicit `retry_after_s` wins; otherwise the class decides. Unknown
/// classes have no cooldown.
pub fn cooldown_for(payload: &CachePayload) -> Option<Duration> {
    let class = payload.error.as_ref()?;
    if let Some(seconds) = payload.retry_after_s {
        return Some(Duration::try_seconds(i64::try_from(seconds).ok()?).unwrap_or(Duration::MAX));
    }
    match class {
        ProviderErrorClass::RateLimited => Some(Duration::seconds(RATE_LIMIT_COOLDOWN_S)),
        ProviderErrorClass::Unauthorized | ProviderErrorClass::MissingApiKey => {
            Some(Duration::seconds(CREDENTIAL_COOLDOWN_S))
        }
        ProviderErrorClass::Other(_) => None,
    }
}

/// Decide whether `payload` should be refreshed at `now`.
///
/// # Examples
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use nearby_backend::domain::nearby::payload::CachePayload;
/// use nearby_backend::domain::nearby::policy::should_refresh_now;
///
/// let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid");
/// let fresh = CachePayload {
///     computed_at: Some(now - Duration::minutes(5)),
///     ..CachePayload::default()
/// };
/// let decision = should_refresh_now(Some(&fresh), now, Duration::hours(1));
/// assert!(!decision.refresh && !decision.stale);
/// ```
pub fn should_refresh_now(
    payload: Option<&CachePayload>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> RefreshDecision {
    let Some(payload) = payload else {
        return RefreshDecision {
            refresh: true,
            stale: true,
            next_retry_at: None,
        };
    };

    let stale = payload
        .computed_at
        .is_none_or(|computed_at| now.signed_duration_since(computed_at) > ttl);
    if !stale {
        return RefreshDecision {
            refresh: false,
            stale: false,
            next_retry_at: None,
        };
    }

    let cooldown_end = payload
        .error_at
        .zip(cooldown_for(payload))
        .and_then(|(error_at, cooldown)| error_at.checked_add_signed(cooldown));
    match cooldown_end {
        Some(next_retry_at) if now < next_retry_at => RefreshDecision {
            refresh: false,
            stale: false,
            next_retry_at: Some(next_retry_at),
        },
        _ => RefreshDecision {
            refresh: true,
            stale: true,
            next_retry_at: None,
        },
    }
}
