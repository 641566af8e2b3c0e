//! HTTP client wrapper for fetching source documents.
//!
//! One request can take as long as it needs: transient transport
//! failures (timeouts, refused connections, server errors) are retried
//! indefinitely with a short randomized backoff, because a half-fetched
//! source is worthless. The only ways out of the retry loop are a
//! successful body, a missing-page verdict from the per-source policy,
//! or cancellation.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::FetchError;
use super::stats::FetchStats;
use crate::cancel::CancelToken;
use crate::plugin::SourcePolicy;

/// Connect timeout for each attempt, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Per-attempt read timeout, in seconds. The retry loop sits above this.
const READ_TIMEOUT_SECS: u64 = 120;

/// Lower bound of the randomized retry sleep, in milliseconds.
const RETRY_SLEEP_MIN_MS: u64 = 250;

/// Upper bound of the randomized retry sleep, in milliseconds.
const RETRY_SLEEP_MAX_MS: u64 = 750;

/// Bodies announced as larger than this get per-chunk progress reporting.
const LARGE_BODY_THRESHOLD: u64 = 5 * 64 * 1024;

/// One fetchable request, as produced by a plugin's locator parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL to request.
    pub url: String,
    /// Form fields for a POST request; `None` means GET.
    pub post_form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    /// Builds a plain GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            post_form: None,
        }
    }

    /// Builds a form-encoded POST request.
    #[must_use]
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            post_form: Some(form),
        }
    }
}

/// Outcome of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPayload {
    /// The full response body.
    Data(Vec<u8>),
    /// The server says the document does not exist (per-source 403/404
    /// policy); the locator is recorded as fetched with no payload.
    Missing,
}

/// HTTP client for fetching source documents.
///
/// Create once per run and share between workers; the underlying
/// `reqwest` client pools connections and carries a cookie jar, which
/// some sources require across a session.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts, gzip and cookies.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = base_builder()
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Fetches one request, retrying transient failures until it
    /// succeeds, resolves as missing, or the run is cancelled.
    ///
    /// Returns `Ok(None)` on cancellation; cancellation is not an error.
    /// Large bodies are read chunk by chunk with a `Downloading...`
    /// status published through `stats`, and the cancel token is checked
    /// between chunks.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] when the locator does not
    /// parse as a URL; transport failures are retried, not returned.
    #[instrument(skip(self, policy, cancel, stats), fields(url = %request.url))]
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        policy: &SourcePolicy,
        cancel: &CancelToken,
        stats: &Arc<FetchStats>,
    ) -> Result<Option<FetchPayload>, FetchError> {
        Url::parse(&request.url).map_err(|_| FetchError::invalid_url(&request.url))?;

        'attempt: loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let response = match self.send(request).await {
                Ok(response) => response,
                Err(error) => {
                    debug!(error = %error, "request failed, retrying");
                    if !self.backoff(stats, cancel).await {
                        return Ok(None);
                    }
                    continue 'attempt;
                }
            };

            let status = response.status();
            if !status.is_success() {
                if matches!(status.as_u16(), 403 | 404) && policy.missing_as_empty {
                    debug!(status = status.as_u16(), "document reported missing");
                    return Ok(Some(FetchPayload::Missing));
                }
                warn!(status = status.as_u16(), "unexpected status, retrying");
                if !self.backoff(stats, cancel).await {
                    return Ok(None);
                }
                continue 'attempt;
            }

            let content_length = response.content_length();
            let report_progress = content_length.is_some_and(|len| len > LARGE_BODY_THRESHOLD);
            let mut body: Vec<u8> = Vec::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk_result) = stream.next().await {
                if cancel.is_cancelled() {
                    stats.clear_status();
                    return Ok(None);
                }
                match chunk_result {
                    Ok(chunk) => {
                        body.extend_from_slice(&chunk);
                        if report_progress {
                            let total_kb = content_length.unwrap_or(0) / 1024;
                            stats.set_status(format!(
                                "Downloading... {} of {} KB",
                                body.len() as u64 / 1024,
                                total_kb
                            ));
                        }
                    }
                    Err(error) => {
                        debug!(error = %error, "body stream failed, retrying");
                        stats.clear_status();
                        if !self.backoff(stats, cancel).await {
                            return Ok(None);
                        }
                        continue 'attempt;
                    }
                }
            }

            if report_progress {
                stats.clear_status();
            }
            return Ok(Some(FetchPayload::Data(body)));
        }
    }

    async fn send(&self, request: &FetchRequest) -> Result<reqwest::Response, reqwest::Error> {
        let builder = match &request.post_form {
            Some(form) => self.client.post(&request.url).form(form),
            None => self.client.get(&request.url),
        };
        builder.send().await
    }

    /// Sleeps a randomized interval before the next attempt.
    ///
    /// Returns false if cancellation arrived before or during the sleep.
    async fn backoff(&self, stats: &Arc<FetchStats>, cancel: &CancelToken) -> bool {
        stats.add_retried();
        let sleep_ms = rand::thread_rng().gen_range(RETRY_SLEEP_MIN_MS..=RETRY_SLEEP_MAX_MS);
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        !cancel.is_cancelled()
    }
}

fn base_builder() -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .gzip(true)
        .cookie_provider(Arc::new(Jar::default()))
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
}
