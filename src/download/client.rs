//! HTTP client shared by every service.
//!
//! Wraps a `reqwest::Client` with the crate User-Agent, timeouts, the
//! per-host [`RateLimiter`] and a [`RetryPolicy`]. Files are streamed to a
//! staging file next to their destination and renamed into place, so an
//! interrupted run never leaves a truncated output that a later run would
//! mistake for a finished one.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::constants::PARTIAL_SUFFIX;
use super::error::DownloadError;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::config::RunSettings;
use crate::user_agent;

/// Content types that signal a service error page instead of a file.
const ERROR_PAGE_TYPES: &[&str] = &["text/html", "text/xml", "application/xml", "vnd.ogc.se_xml"];

/// Bytes of an error page kept in the resulting error message.
const ERROR_PAGE_EXCERPT: usize = 300;

/// HTTP client with retry, rate limiting and staged file writes.
///
/// Cloning is cheap; clones share the connection pool and the limiter.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Creates a client from resolved run settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot be set up.
    pub fn new(settings: &RunSettings) -> Result<Self, DownloadError> {
        Self::with_policy(settings, RetryPolicy::from_settings(settings))
    }

    /// Creates a client with an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the TLS backend cannot be set up.
    pub fn with_policy(settings: &RunSettings, retry: RetryPolicy) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::Client { source })?;
        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit)),
            retry,
        })
    }

    /// GETs `url` and decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted, or
    /// [`DownloadError::Decode`] if the body is not JSON.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, DownloadError> {
        self.with_retry(url, move || async move {
            let response = self.send(self.client.get(url), url).await?;
            decode_json(response, url).await
        })
        .await
    }

    /// GETs `url` and returns the body as text.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        self.with_retry(url, move || async move {
            let response = self.send(self.client.get(url), url).await?;
            response.text().await.map_err(|e| body_error(url, e))
        })
        .await
    }

    /// POSTs a JSON body to `url` and decodes the JSON answer.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted, or
    /// [`DownloadError::Decode`] if the answer is not JSON.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DownloadError> {
        self.with_retry(url, move || async move {
            let response = self.send(self.client.post(url).json(body), url).await?;
            decode_json(response, url).await
        })
        .await
    }

    /// Streams `url` into `dest`, returning the number of bytes written.
    ///
    /// The body is staged in a hidden `.part` file next to `dest` and
    /// renamed once complete; the staging file is removed on failure. A
    /// response served as HTML or XML is treated as a service error page.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted.
    #[instrument(level = "debug", skip(self), fields(dest = %dest.display()))]
    pub async fn download_to_path(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let staging = staging_path(url, dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let staged = staging.as_path();
        let bytes = self
            .with_retry(url, move || async move {
                let response = self.send(self.client.get(url), url).await?;
                let response = reject_error_page(response, url).await?;
                let result = stream_to_file(response, url, staged).await;
                if result.is_err() {
                    let _ = tokio::fs::remove_file(staged).await;
                }
                result
            })
            .await?;

        if let Err(e) = tokio::fs::rename(&staging, dest).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(DownloadError::io(dest, e));
        }
        debug!(url, bytes, "download complete");
        Ok(bytes)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, DownloadError> {
        let response = request.send().await.map_err(|e| body_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }
        Ok(response)
    }

    /// Runs `attempt_fn` until it succeeds or the retry policy gives up.
    async fn with_retry<T, F, Fut>(&self, url: &str, attempt_fn: F) -> Result<T, DownloadError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        if url::Url::parse(url).is_err() {
            return Err(DownloadError::invalid_url(url));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.rate_limiter.acquire(url).await;

            let error = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            let retry_after_delay = match (&error, failure_type) {
                (
                    DownloadError::HttpStatus {
                        retry_after: Some(header),
                        ..
                    },
                    FailureType::RateLimited,
                ) => parse_retry_after(header),
                _ => None,
            };
            if let Some(delay) = retry_after_delay {
                self.rate_limiter.record_rate_limit(url, delay).await;
            }

            match self.retry.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    // The limiter already waits out a Retry-After pause.
                    let delay = if retry_after_delay.is_some() {
                        std::time::Duration::ZERO
                    } else {
                        backoff_delay
                    };
                    info!(
                        url,
                        attempt = next_attempt,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after_delay.is_some(),
                        error = %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying request");
                    return Err(error);
                }
            }
        }
    }
}

fn body_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

async fn decode_json(response: Response, url: &str) -> Result<serde_json::Value, DownloadError> {
    let body = response.bytes().await.map_err(|e| body_error(url, e))?;
    serde_json::from_slice(&body).map_err(|e| DownloadError::decode(url, e))
}

async fn reject_error_page(response: Response, url: &str) -> Result<Response, DownloadError> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ERROR_PAGE_TYPES.iter().any(|t| content_type.contains(t)) {
        return Ok(response);
    }
    let body = response.text().await.map_err(|e| body_error(url, e))?;
    let excerpt: String = body.trim().chars().take(ERROR_PAGE_EXCERPT).collect();
    Err(DownloadError::decode(
        url,
        format!("service returned {content_type} instead of a file: {excerpt}"),
    ))
}

async fn stream_to_file(response: Response, url: &str, path: &Path) -> Result<u64, DownloadError> {
    let file = File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| body_error(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;
    Ok(bytes_written)
}

/// Hidden staging file next to `dest`, keyed by the request URL.
fn staging_path(url: &str, dest: &Path) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    let key: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{key}{PARTIAL_SUFFIX}"))
}
