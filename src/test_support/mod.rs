//! Shared helpers for unit tests that bind local sockets.

pub mod socket_guard;

use std::time::Duration;

use crate::config::RunSettings;
use crate::download::{HttpClient, RetryPolicy};
use crate::services::{ServiceEndpoints, Services};

/// Services pointed at a mock server, without rate limiting or retries.
#[allow(clippy::unwrap_used)]
pub fn mock_services(base: &str) -> Services {
    let settings = RunSettings {
        rate_limit: Duration::ZERO,
        ..RunSettings::default()
    };
    let http = HttpClient::with_policy(&settings, RetryPolicy::immediate(1)).unwrap();
    Services::new(http, ServiceEndpoints::all_at(base))
}
