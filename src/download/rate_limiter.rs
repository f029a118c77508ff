//! Per-host rate limiting for service requests.
//!
//! The public data services behind hysetter (GeoServer, THREDDS, NWIS)
//! throttle aggressive clients. [`RateLimiter`] enforces a minimum delay
//! between consecutive requests to the same host; requests to different
//! hosts never wait on each other.
//!
//! ```
//! use std::time::Duration;
//! use hysetter_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(250));
//! limiter.acquire("https://waterservices.usgs.gov/nwis/site/").await;
//! // Waits until 250ms have passed since the previous request to this host.
//! limiter.acquire("https://waterservices.usgs.gov/nwis/dv/").await;
//! // Different host, proceeds immediately.
//! limiter.acquire("https://maps.isric.org/mapserv").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Per-host rate limiter, shared behind an `Arc` by every service client.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between requests to the same host.
    min_interval: Duration,

    /// Per-host state. Values are `Arc`ed so the map shard lock is released
    /// before awaiting the inner mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// `None` until the first request, which never waits.
    last_request: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
    /// Earliest instant a request may be sent after a server-mandated pause.
    blocked_until: Mutex<Option<Instant>>,
}

impl HostState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
            blocked_until: Mutex::new(None),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter; a zero interval disables limiting.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            min_interval,
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.min_interval.is_zero()
    }

    /// Returns the minimum delay between requests to one host.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone()
    }

    /// Waits until a request to `url`'s host is allowed, then records it.
    ///
    /// A pause recorded with [`RateLimiter::record_rate_limit`] is honored
    /// even when limiting is otherwise disabled.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = host_key(url);
        tracing::Span::current().record("host", &host);
        let state = self.state(&host);

        let blocked_until = *state.blocked_until.lock().await;
        if let Some(until) = blocked_until {
            let now = Instant::now();
            if until > now {
                debug!(host = %host, wait_ms = (until - now).as_millis(), "honoring server pause");
                tokio::time::sleep_until(until).await;
            }
        }

        if self.is_disabled() {
            return;
        }

        let mut last_request = state.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval.saturating_sub(elapsed);
                let cumulative = state.add_cumulative_delay(delay);
                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting - consider a smaller AOI or fewer variables"
                    );
                }
                tokio::time::sleep(delay).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    /// Records a server-mandated pause (from a Retry-After header).
    ///
    /// Every later [`RateLimiter::acquire`] for the same host waits until
    /// the pause has elapsed.
    #[instrument(skip(self), fields(host))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = host_key(url);
        tracing::Span::current().record("host", &host);
        let state = self.state(&host);

        let until = Instant::now() + delay;
        {
            let mut blocked = state.blocked_until.lock().await;
            if blocked.is_none_or(|current| current < until) {
                *blocked = Some(until);
            }
        }
        let cumulative = state.add_cumulative_delay(delay);
        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - service may be under heavy load"
            );
        }
    }
}

/// Lowercased host of `url`, or `"unknown"` for malformed URLs so they are
/// still limited together.
///
/// ```
/// use hysetter_core::download::rate_limiter::host_key;
///
/// assert_eq!(host_key("https://Maps.ISRIC.org/mapserv"), "maps.isric.org");
/// assert_eq!(host_key("http://127.0.0.1:8080/ows"), "127.0.0.1");
/// assert_eq!(host_key("not a url"), "unknown");
/// ```
#[must_use]
pub fn host_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Accepts integer seconds or an HTTP-date (RFC 7231). Returns `None` for
/// unparseable values and caps the result at one hour.
///
/// ```
/// use std::time::Duration;
/// use hysetter_core::download::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(cap_retry_after(duration)),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past");
            Some(Duration::ZERO)
        }
    }
}

fn cap_retry_after(duration: Duration) -> Duration {
    if duration > MAX_RETRY_AFTER {
        warn!(
            delay_secs = duration.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping at 1 hour"
        );
        return MAX_RETRY_AFTER;
    }
    duration
}
