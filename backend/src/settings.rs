//! Startup settings loaded via OrthoConfig.
//!
//! Every value can come from `NEARBY_*` environment variables, CLI flags or a
//! configuration file. Unset values fall back to the defaults below; the
//! nearby tunables then seed the live [`NearbyConfig`], which operators can
//! change at runtime.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::nearby::NearbyConfig;
use crate::domain::nearby::lock::{DEFAULT_LOCK_TTL_S, LOCK_TTL_RANGE_S};
use crate::domain::ports::ApiKey;
use crate::outbound::queue::DEFAULT_FALLBACK_DELAY;
use crate::outbound::routing::DEFAULT_ENDPOINT;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings values that do not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Bind address is not `host:port`.
    #[error("invalid bind address {value:?}: {message}")]
    BindAddr { value: String, message: String },
    /// Provider endpoint is not an absolute URL.
    #[error("invalid provider endpoint {value:?}: {message}")]
    ProviderEndpoint { value: String, message: String },
}

/// Process settings for the nearby service.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "NEARBY")]
pub struct NearbySettings {
    /// Socket address the HTTP server binds to.
    pub bind_addr: Option<String>,
    /// PostgreSQL URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub db_max_connections: Option<u32>,
    /// Routing provider base URL.
    pub provider_endpoint: Option<String>,
    /// Routing provider credential.
    pub api_key: Option<String>,
    /// Movement profile.
    pub profile: Option<String>,
    /// Search radius in metres.
    pub radius_m: Option<u32>,
    /// Candidates routed per recompute.
    pub max_candidates: Option<u32>,
    /// Destinations per matrix call.
    pub batch_size: Option<u32>,
    /// Items kept per cached list.
    pub result_limit: Option<u32>,
    /// Cache TTL in seconds.
    pub ttl_s: Option<u64>,
    /// Walking speed for direct-line estimates.
    pub walking_speed_mps: Option<f64>,
    /// Refresh stale lists on read.
    pub auto_refresh: Option<bool>,
    /// Worker tasks draining the in-process queue.
    pub workers: Option<usize>,
    /// Delay of the timer fallback queue in milliseconds.
    pub fallback_delay_ms: Option<u64>,
    /// Age in seconds after which a recompute lock is abandoned.
    pub lock_ttl_s: Option<u64>,
    /// Routing provider request timeout in milliseconds.
    pub provider_timeout_ms: Option<u64>,
}

impl fmt::Debug for NearbySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearbySettings")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("provider_endpoint", &self.provider_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl NearbySettings {
    /// Parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse().map_err(|err: std::net::AddrParseError| SettingsError::BindAddr {
            value: raw.to_owned(),
            message: err.to_string(),
        })
    }

    /// Parsed routing provider base URL.
    pub fn provider_endpoint(&self) -> Result<Url, SettingsError> {
        let raw = self.provider_endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Url::parse(raw).map_err(|err| SettingsError::ProviderEndpoint {
            value: raw.to_owned(),
            message: err.to_string(),
        })
    }

    /// Initial live configuration, before clamping.
    pub fn nearby_config(&self) -> NearbyConfig {
        let defaults = NearbyConfig::default();
        NearbyConfig {
            api_key: self.api_key.clone().and_then(ApiKey::new),
            profile: self.profile.clone().unwrap_or(defaults.profile),
            radius_m: self.radius_m.unwrap_or(defaults.radius_m),
            max_candidates: self.max_candidates.unwrap_or(defaults.max_candidates),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            result_limit: self.result_limit.unwrap_or(defaults.result_limit),
            ttl_s: self.ttl_s.unwrap_or(defaults.ttl_s),
            walking_speed_mps: self.walking_speed_mps.unwrap_or(defaults.walking_speed_mps),
            auto_refresh: self.auto_refresh.unwrap_or(defaults.auto_refresh),
        }
    }

    /// Worker task count, at least one.
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS).max(1)
    }

    /// Delay before the timer fallback runs a job.
    pub fn fallback_delay(&self) -> Duration {
        self.fallback_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FALLBACK_DELAY)
    }

    /// Age after which a held recompute lock is considered abandoned,
    /// clamped to [`LOCK_TTL_RANGE_S`].
    pub fn lock_ttl(&self) -> chrono::Duration {
        let secs = self
            .lock_ttl_s
            .map_or(DEFAULT_LOCK_TTL_S, |secs| i64::try_from(secs).unwrap_or(i64::MAX));
        chrono::Duration::seconds(secs.clamp(*LOCK_TTL_RANGE_S.start(), *LOCK_TTL_RANGE_S.end()))
    }

    /// Routing provider request timeout.
    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 8] = [
        "NEARBY_BIND_ADDR",
        "NEARBY_DATABASE_URL",
        "NEARBY_API_KEY",
        "NEARBY_RADIUS_M",
        "NEARBY_WORKERS",
        "NEARBY_AUTO_REFRESH",
        "NEARBY_PROVIDER_ENDPOINT",
        "NEARBY_LOCK_TTL_S",
    ];

    fn load_from_empty_args() -> NearbySettings {
        NearbySettings::load_from_iter([OsString::from("nearby-backend")])
            .expect("settings should load")
    }

    #[rstest]
    fn defaults_apply_when_unset() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.bind_addr().expect("default bind address"),
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().expect("valid literal")
        );
        assert!(settings.database_url.is_none());
        assert_eq!(settings.workers(), DEFAULT_WORKERS);
        assert_eq!(settings.fallback_delay(), DEFAULT_FALLBACK_DELAY);
        assert_eq!(settings.lock_ttl(), chrono::Duration::seconds(600));
        assert_eq!(settings.nearby_config(), NearbyConfig::default());
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("NEARBY_BIND_ADDR", Some("127.0.0.1:9000".to_owned())),
            ("NEARBY_DATABASE_URL", None),
            ("NEARBY_API_KEY", Some("  secret  ".to_owned())),
            ("NEARBY_RADIUS_M", Some("2500".to_owned())),
            ("NEARBY_WORKERS", Some("0".to_owned())),
            ("NEARBY_AUTO_REFRESH", Some("false".to_owned())),
            ("NEARBY_PROVIDER_ENDPOINT", None),
            ("NEARBY_LOCK_TTL_S", Some("30".to_owned())),
        ]);

        let settings = load_from_empty_args();
        let config = settings.nearby_config();

        assert_eq!(
            settings.bind_addr().expect("bind address"),
            "127.0.0.1:9000".parse::<SocketAddr>().expect("valid literal")
        );
        assert_eq!(config.radius_m, 2500);
        assert!(!config.auto_refresh);
        assert_eq!(config.api_key.as_ref().map(ApiKey::expose), Some("secret"));
        assert_eq!(settings.workers(), 1, "worker count is at least one");
        assert_eq!(settings.lock_ttl(), chrono::Duration::seconds(30));
    }

    #[rstest]
    #[case("18446744073709551615", 86_400)]
    #[case("0", 1)]
    fn lock_ttl_is_clamped(#[case] raw: &str, #[case] expected_s: i64) {
        let _guard = lock_env([("NEARBY_LOCK_TTL_S", Some(raw.to_owned()))]);

        let settings = load_from_empty_args();
        assert_eq!(settings.lock_ttl(), chrono::Duration::seconds(expected_s));
    }

    #[rstest]
    fn malformed_bind_address_is_reported() {
        let _guard = lock_env([("NEARBY_BIND_ADDR", Some("not-an-address".to_owned()))]);

        let settings = load_from_empty_args();
        assert!(matches!(
            settings.bind_addr(),
            Err(SettingsError::BindAddr { .. })
        ));
    }

    #[rstest]
    fn debug_output_redacts_credentials() {
        let _guard = lock_env([("NEARBY_API_KEY", Some("secret".to_owned()))]);

        let settings = load_from_empty_args();
        assert!(!format!("{settings:?}").contains("secret"));
    }
}
