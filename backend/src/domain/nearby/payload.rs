//! Cached nearby list payload and its items.
//!
//! The payload is stored as one JSON attribute per origin and slot. Field
//! names are part of the stored format; change them only with a migration.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ports::RoutingProviderError;
use crate::domain::{EntityId, EntityKind};

/// Provider label of items produced by the geometric estimator.
pub const ESTIMATOR_PROVIDER: &str = "estimator";

/// One neighbour with its distance and duration from the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyItem {
    /// Target entity.
    pub id: EntityId,
    /// Target entity kind.
    pub kind: EntityKind,
    /// Distance in metres.
    pub distance_m: u64,
    /// Duration in seconds.
    pub duration_s: u64,
    /// Routing provider name, or [`ESTIMATOR_PROVIDER`].
    pub provider: String,
    /// Movement profile the values were computed for.
    pub profile: String,
    /// `true` only for direct-line estimates.
    #[serde(default)]
    pub direct_line: bool,
}

/// Candidates processed by the current or last computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Candidates already routed.
    pub done: u32,
    /// Candidates selected for this run.
    pub total: u32,
}

/// Classification of the last provider failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderErrorClass {
    /// Quota or rate limit exceeded.
    RateLimited,
    /// Credential rejected.
    Unauthorized,
    /// No credential configured.
    MissingApiKey,
    /// Any other provider error code (`timeout`, `http_502`, ...).
    Other(String),
}

impl ProviderErrorClass {
    /// Stored code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::MissingApiKey => "missing_api_key",
            Self::Other(code) => code.as_str(),
        }
    }

    /// Whether retrying needs operator action on credentials.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::MissingApiKey)
    }
}

impl From<String> for ProviderErrorClass {
    fn from(value: String) -> Self {
        match value.as_str() {
            "rate_limited" => Self::RateLimited,
            "unauthorized" => Self::Unauthorized,
            "missing_api_key" => Self::MissingApiKey,
            _ => Self::Other(value),
        }
    }
}

impl From<ProviderErrorClass> for String {
    fn from(value: ProviderErrorClass) -> Self {
        match value {
            ProviderErrorClass::Other(code) => code,
            known => known.as_str().to_owned(),
        }
    }
}

impl From<&RoutingProviderError> for ProviderErrorClass {
    fn from(err: &RoutingProviderError) -> Self {
        match err {
            RoutingProviderError::RateLimited { .. } => Self::RateLimited,
            RoutingProviderError::Unauthorized { .. } => Self::Unauthorized,
            RoutingProviderError::MissingApiKey => Self::MissingApiKey,
            RoutingProviderError::Timeout { .. } => Self::Other("timeout".to_owned()),
            RoutingProviderError::Transport { .. } => Self::Other("transport".to_owned()),
            RoutingProviderError::Decode { .. } => Self::Other("decode".to_owned()),
            RoutingProviderError::Upstream { status, .. } => Self::Other(format!("http_{status}")),
        }
    }
}

impl Serialize for ProviderErrorClass {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderErrorClass {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for ProviderErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached nearby list for one origin and slot.
///
/// ## Invariants
/// - `items` holds no duplicate ids and is ordered by ascending duration.
/// - `partial` implies `progress.done < progress.total`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CachePayload {
    /// Neighbours, nearest first.
    #[serde(default)]
    pub items: Vec<NearbyItem>,
    /// Time of the last successful (possibly partial) computation.
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
    /// Whether a multi-batch computation is still incomplete.
    #[serde(default)]
    pub partial: bool,
    /// Candidates processed so far.
    #[serde(default)]
    pub progress: Progress,
    /// Last provider failure class.
    #[serde(default)]
    pub error: Option<ProviderErrorClass>,
    /// When `error` was recorded.
    #[serde(default)]
    pub error_at: Option<DateTime<Utc>>,
    /// Backoff before the next attempt, in seconds.
    #[serde(default)]
    pub retry_after_s: Option<u64>,
}

impl CachePayload {
    /// Record a provider failure.
    pub fn record_error(
        &mut self,
        class: ProviderErrorClass,
        at: DateTime<Utc>,
        retry_after_s: Option<u64>,
    ) {
        self.error = Some(class);
        self.error_at = Some(at);
        self.retry_after_s = retry_after_s;
    }

    /// Forget the last provider failure.
    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_at = None;
        self.retry_after_s = None;
    }
}

/// Deduplicate by id (keeping the shortest duration), sort by duration then
/// distance then id, and truncate to `limit`.
///
/// # Examples
/// ```
/// use nearby_backend::domain::nearby::payload::{NearbyItem, rank_items};
/// use nearby_backend::domain::{EntityId, EntityKind};
///
/// let item = |id, duration_s| NearbyItem {
///     id: EntityId::new(id).expect("positive"),
///     kind: EntityKind::Poi,
///     distance_m: duration_s,
///     duration_s,
///     provider: "estimator".into(),
///     profile: "foot-walking".into(),
///     direct_line: true,
/// };
/// let ranked = rank_items(vec![item(2, 50), item(1, 90), item(2, 40)], 10);
/// let ids: Vec<i64> = ranked.iter().map(|i| i.id.get()).collect();
/// assert_eq!(ids, vec![2, 1]);
/// assert_eq!(ranked[0].duration_s, 40);
/// ```
pub fn rank_items(items: impl IntoIterator<Item = NearbyItem>, limit: usize) -> Vec<NearbyItem> {
    let mut best: HashMap<EntityId, NearbyItem> = HashMap::new();
    for item in items {
        match best.get(&item.id) {
            Some(existing) if existing.duration_s <= item.duration_s => {}
            _ => {
                best.insert(item.id, item);
            }
        }
    }
    let mut ranked: Vec<NearbyItem> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        a.duration_s
            .cmp(&b.duration_s)
            .then_with(|| a.distance_m.cmp(&b.distance_m))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn item(id: i64, duration_s: u64) -> NearbyItem {
        NearbyItem {
            id: EntityId::new(id).expect("positive id"),
            kind: EntityKind::ChargingPoint,
            distance_m: duration_s * 2,
            duration_s,
            provider: "openrouteservice".to_owned(),
            profile: "foot-walking".to_owned(),
            direct_line: false,
        }
    }

    #[rstest]
    fn payload_round_trips_through_json() {
        let at = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid time");
        let mut payload = CachePayload {
            items: vec![item(3, 60), item(4, 120)],
            computed_at: Some(at),
            partial: true,
            progress: Progress { done: 10, total: 20 },
            ..CachePayload::default()
        };
        payload.record_error(ProviderErrorClass::Other("http_502".to_owned()), at, Some(30));

        let value = serde_json::to_value(&payload).expect("payload serialises");
        let decoded: CachePayload = serde_json::from_value(value).expect("payload decodes");

        assert_eq!(decoded, payload);
    }

    #[rstest]
    fn legacy_payload_without_optional_fields_decodes() {
        let decoded: CachePayload =
            serde_json::from_value(json!({ "items": [] })).expect("payload decodes");
        assert_eq!(decoded, CachePayload::default());
    }

    #[rstest]
    #[case("rate_limited", ProviderErrorClass::RateLimited)]
    #[case("unauthorized", ProviderErrorClass::Unauthorized)]
    #[case("missing_api_key", ProviderErrorClass::MissingApiKey)]
    #[case("timeout", ProviderErrorClass::Other("timeout".to_owned()))]
    fn error_class_uses_plain_codes(#[case] code: &str, #[case] class: ProviderErrorClass) {
        let encoded = serde_json::to_value(&class).expect("class serialises");
        assert_eq!(encoded, json!(code));
        assert_eq!(ProviderErrorClass::from(code.to_owned()), class);
    }

    #[rstest]
    #[case(RoutingProviderError::rate_limited("quota", None), "rate_limited")]
    #[case(RoutingProviderError::unauthorized(401_u16, "bad"), "unauthorized")]
    #[case(RoutingProviderError::missing_api_key(), "missing_api_key")]
    #[case(RoutingProviderError::upstream(502_u16, "bad gateway", None::<u64>), "http_502")]
    #[case(RoutingProviderError::decode("eof"), "decode")]
    fn provider_errors_are_classified(#[case] err: RoutingProviderError, #[case] code: &str) {
        assert_eq!(ProviderErrorClass::from(&err).as_str(), code);
    }

    #[rstest]
    fn rank_items_truncates_after_sorting() {
        let ranked = rank_items(vec![item(1, 300), item(2, 100), item(3, 200)], 2);
        let ids: Vec<i64> = ranked.iter().map(|i| i.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
