//! HTTP plumbing shared by every service client.
//!
//! - [`HttpClient`]: `reqwest` client with the crate User-Agent, timeouts,
//!   retries and staged file downloads
//! - [`RateLimiter`]: minimum spacing between requests to the same host
//! - [`RetryPolicy`]: exponential backoff with jitter for transient failures
//!
//! ```no_run
//! use hysetter_core::{HttpClient, RunSettings};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&RunSettings::default())?;
//! let bytes = client
//!     .download_to_path("https://example.com/dem.tif", Path::new("./data/dem.tif"))
//!     .await?;
//! println!("wrote {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub mod rate_limiter;
mod retry;

pub use client::HttpClient;
pub use error::DownloadError;
pub use rate_limiter::{RateLimiter, host_key, parse_retry_after};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
