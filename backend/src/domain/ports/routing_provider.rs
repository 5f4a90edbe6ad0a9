//! Driven port for one-origin, many-destination routing matrices.
//!
//! The domain owns the request shape and the error taxonomy so the matrix
//! job can classify provider failures without knowing any wire format.

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::define_port_error;
use crate::domain::Coordinates;

/// Routing provider credential.
///
/// The secret is wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    /// Wrap a non-blank key. Surrounding whitespace is trimmed.
    ///
    /// # Examples
    /// ```
    /// use nearby_backend::domain::ports::ApiKey;
    ///
    /// assert!(ApiKey::new("  ").is_none());
    /// let key = ApiKey::new("secret").expect("non-blank key");
    /// assert_eq!(key.expose(), "secret");
    /// ```
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = Zeroizing::new(raw.into());
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(Zeroizing::new(trimmed.to_owned())))
    }

    /// Borrow the secret for an outbound request.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Short SHA-256 fingerprint for operators to compare keys safely.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..6])
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

/// Matrix request from one origin to a batch of destinations.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRequest {
    /// Origin position.
    pub origin: Coordinates,
    /// Destination positions; response cells follow this order.
    pub destinations: Vec<Coordinates>,
    /// Provider movement profile, e.g. `foot-walking`.
    pub profile: String,
    /// Credential read from the live configuration.
    pub api_key: Option<ApiKey>,
}

/// Routed distance and duration for one destination.
///
/// Either value is `None` when the provider could not route to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatrixCell {
    /// Distance in metres.
    pub distance_m: Option<f64>,
    /// Duration in seconds.
    pub duration_s: Option<f64>,
}

impl MatrixCell {
    /// Rounded `(distance_m, duration_s)` when both values are usable.
    pub fn routed(&self) -> Option<(u64, u64)> {
        let distance = self.distance_m.filter(|d| d.is_finite() && *d >= 0.0)?;
        let duration = self.duration_s.filter(|d| d.is_finite() && *d >= 0.0)?;
        Some((distance.round() as u64, duration.round() as u64))
    }
}

/// Matrix response with one cell per requested destination.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixResponse {
    /// Cells in destination order.
    pub cells: Vec<MatrixCell>,
}

define_port_error! {
    /// Errors surfaced while calling the routing provider.
    pub enum RoutingProviderError {
        /// No credential is configured.
        MissingApiKey => "routing provider api key is not configured",
        /// Provider rejected the credential.
        Unauthorized { status: u16, message: String } =>
            "routing provider rejected credentials ({status}): {message}",
        /// Provider quota or rate limit was hit.
        RateLimited { message: String, retry_after_s: Option<u64> } =>
            "routing provider rate limited request: {message}",
        /// Request did not complete in time, locally or at a gateway.
        Timeout { message: String, retry_after_s: Option<u64> } =>
            "routing provider timeout: {message}",
        /// Network transport failed before a response arrived.
        Transport { message: String } => "routing provider transport failed: {message}",
        /// Provider answered with an unexpected status, typically a 5xx.
        Upstream { status: u16, message: String, retry_after_s: Option<u64> } =>
            "routing provider returned {status}: {message}",
        /// Response body could not be decoded.
        Decode { message: String } => "routing provider response decode failed: {message}",
    }
}

impl RoutingProviderError {
    /// HTTP status observed from the provider, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. } | Self::Upstream { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::MissingApiKey
            | Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::Decode { .. } => None,
        }
    }

    /// Backoff suggested by the provider through `Retry-After`.
    pub fn retry_after_s(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_s, .. }
            | Self::Timeout { retry_after_s, .. }
            | Self::Upstream { retry_after_s, .. } => *retry_after_s,
            Self::MissingApiKey
            | Self::Unauthorized { .. }
            | Self::Transport { .. }
            | Self::Decode { .. } => None,
        }
    }
}

/// Port for routing matrix queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Stable provider identifier recorded on every routed item.
    fn name(&self) -> &'static str;

    /// Query distances and durations from one origin to many destinations.
    async fn matrix(&self, request: &MatrixRequest) -> Result<MatrixResponse, RoutingProviderError>;
}
