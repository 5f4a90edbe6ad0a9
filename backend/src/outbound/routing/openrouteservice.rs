//! Reqwest-backed openrouteservice matrix adapter.
//!
//! Owns transport details only: request serialisation, credential header,
//! timeout and HTTP status mapping, and JSON decoding into matrix cells.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::dto::{ErrorBodyDto, MatrixRequestDto, MatrixResponseDto};
use crate::domain::ports::{MatrixRequest, MatrixResponse, RoutingProvider, RoutingProviderError};

/// Public openrouteservice API base.
pub const DEFAULT_ENDPOINT: &str = "https://api.openrouteservice.org";

const USER_AGENT: &str = "nearby-backend/0.1";
const PROVIDER_NAME: &str = "openrouteservice";

/// Matrix client for one openrouteservice deployment.
pub struct OpenRouteServiceMatrix {
    client: Client,
    endpoint: Url,
}

impl OpenRouteServiceMatrix {
    /// Build a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, endpoint })
    }

    fn matrix_url(&self, profile: &str) -> Result<Url, RoutingProviderError> {
        matrix_url(&self.endpoint, profile)
    }
}

fn matrix_url(endpoint: &Url, profile: &str) -> Result<Url, RoutingProviderError> {
    let profile = profile.trim();
    if profile.is_empty() {
        return Err(RoutingProviderError::transport("routing profile is blank"));
    }
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| RoutingProviderError::transport(format!("invalid endpoint: {endpoint}")))?
        .pop_if_empty()
        .extend(["v2", "matrix", profile]);
    Ok(url)
}

#[async_trait]
impl RoutingProvider for OpenRouteServiceMatrix {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn matrix(&self, request: &MatrixRequest) -> Result<MatrixResponse, RoutingProviderError> {
        let api_key = request
            .api_key
            .as_ref()
            .ok_or_else(RoutingProviderError::missing_api_key)?;
        if request.destinations.is_empty() {
            return Ok(MatrixResponse::default());
        }

        let url = self.matrix_url(&request.profile)?;
        let body = MatrixRequestDto::new(request.origin, &request.destinations);
        debug!(
            destinations = request.destinations.len(),
            profile = %request.profile,
            key = %api_key.fingerprint(),
            "requesting routing matrix"
        );
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, api_key.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let retry_after_s = parse_retry_after(response.headers());
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, retry_after_s, bytes.as_ref()));
        }
        parse_matrix(bytes.as_ref(), request.destinations.len())
    }
}

fn parse_matrix(body: &[u8], expected: usize) -> Result<MatrixResponse, RoutingProviderError> {
    let decoded: MatrixResponseDto = serde_json::from_slice(body).map_err(|err| {
        RoutingProviderError::decode(format!("invalid matrix JSON payload: {err}"))
    })?;
    decoded
        .into_domain(expected)
        .map_err(RoutingProviderError::decode)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn map_transport_error(error: reqwest::Error) -> RoutingProviderError {
    if error.is_timeout() {
        RoutingProviderError::timeout(error.to_string(), None::<u64>)
    } else {
        RoutingProviderError::transport(error.to_string())
    }
}

fn map_status_error(
    status: StatusCode,
    retry_after_s: Option<u64>,
    body: &[u8],
) -> RoutingProviderError {
    let message = error_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RoutingProviderError::unauthorized(status.as_u16(), message)
        }
        StatusCode::TOO_MANY_REQUESTS => RoutingProviderError::rate_limited(message, retry_after_s),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            RoutingProviderError::timeout(message, retry_after_s)
        }
        _ => RoutingProviderError::upstream(status.as_u16(), message, retry_after_s),
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    if let Ok(decoded) = serde_json::from_slice::<ErrorBodyDto>(body) {
        return decoded.into_message();
    }
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if compact.is_empty() {
        return format!("status {}", status.as_u16());
    }
    let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
