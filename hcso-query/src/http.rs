//! Shared HTTP client and response mapping for HTTP-backed providers.
//!
//! Provides a configured [`reqwest::Client`] with browser-like headers,
//! cookie support and rotating User-Agent strings, plus helpers that turn
//! transport failures and non-success statuses into [`ProviderError`]s the
//! retry engine can classify.
//!
//! Error messages never include the request URL, which may carry the query.

use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{ProviderError, ProviderErrorKind, QueryError};

/// Browser identities a client picks from when none is configured.
/// Several lookup services refuse obvious library agents.
const BROWSER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// Provider APIs answer with JSON; plain text is accepted for whois-style endpoints.
const ACCEPT: &str = "application/json, text/plain;q=0.9, */*;q=0.5";

/// Redirect hops followed before the request fails as a transport error.
const MAX_REDIRECTS: usize = 5;

/// Build the [`reqwest::Client`] one provider's queries go through.
///
/// Requests time out after `timeout_seconds`, identify as `config.user_agent`
/// or a rotated browser agent, and ask for JSON. Cookies persist for the
/// life of the client so session-gated providers keep working across retries.
///
/// # Errors
///
/// Returns [`QueryError::Config`] if the configured User-Agent is not a
/// valid header value or the TLS backend fails to initialise.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, QueryError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));

    reqwest::Client::builder()
        .user_agent(user_agent_for(config))
        .default_headers(headers)
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| QueryError::Config(format!("cannot build provider HTTP client: {e}")))
}

/// The User-Agent a client built from `config` sends.
pub fn user_agent_for(config: &ClientConfig) -> &str {
    config
        .user_agent
        .as_deref()
        .or_else(|| BROWSER_AGENTS.choose(&mut rand::thread_rng()).copied())
        .unwrap_or(BROWSER_AGENTS[0])
}

/// Send a request and decode a JSON response body.
///
/// # Errors
///
/// - transport failures map to [`ProviderErrorKind::Timeout`] or
///   [`ProviderErrorKind::Transport`]
/// - non-success statuses map through [`ProviderError::from_status`]
/// - a body that is not valid JSON for `T` maps to [`ProviderErrorKind::Decode`]
pub async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = send(request).await?;
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ProviderError::new(ProviderErrorKind::Decode, format!("invalid JSON body: {e}"))
    })
}

/// Send a request and return the response body as text.
///
/// # Errors
///
/// Same mapping as [`fetch_json`], minus JSON decoding.
pub async fn fetch_text(request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    let response = send(request).await?;
    response.text().await.map_err(map_reqwest_error)
}

async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "provider returned non-success status");
        return Err(ProviderError::from_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("unexpected status"),
        ));
    }
    Ok(response)
}

/// Map a [`reqwest::Error`] to a provider failure, dropping the URL.
pub fn map_reqwest_error(error: reqwest::Error) -> ProviderError {
    let kind = if error.is_timeout() {
        ProviderErrorKind::Timeout
    } else if error.is_decode() {
        ProviderErrorKind::Decode
    } else if let Some(status) = error.status() {
        ProviderErrorKind::from_status(status.as_u16())
    } else {
        ProviderErrorKind::Transport
    };
    let status = error.status().map(|s| s.as_u16());
    ProviderError {
        kind,
        status,
        message: error.without_url().to_string(),
    }
}
