//! Shared helpers for integration tests.
//!
//! Used by `tests/pipeline_integration.rs` and `tests/cli_e2e.rs` to build
//! configs over a temporary project directory and services pointed at a
//! wiremock server.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::{Path, PathBuf};
use std::time::Duration;

use hysetter_core::download::{HttpClient, RetryPolicy};
use hysetter_core::{Config, RunSettings, ServiceEndpoints, Services};
use serde_json::json;

/// Services pointed at a mock server, without rate limiting or retries.
pub fn mock_services(base: &str) -> Services {
    let settings = RunSettings {
        rate_limit: Duration::ZERO,
        ..RunSettings::default()
    };
    let http = HttpClient::with_policy(&settings, RetryPolicy::immediate(1))
        .expect("failed to build HTTP client");
    Services::new(http, ServiceEndpoints::all_at(base))
}

/// A config rooted at `dir` with `body` appended after the project block.
pub fn config(dir: &Path, body: &str) -> Config {
    Config::from_yaml_str(&config_yaml(dir, body)).expect("test config should be valid")
}

pub fn config_yaml(dir: &Path, body: &str) -> String {
    format!("project:\n  name: demo\n  data_dir: {}\n{body}", dir.display())
}

/// Writes a GeoJSON file with one square polygon per entry of `wests`
/// (0.5 degrees wide, 39.5..40.0 latitude) and returns its path.
pub fn write_squares(dir: &Path, wests: &[f64]) -> PathBuf {
    let features: Vec<_> = wests
        .iter()
        .enumerate()
        .map(|(i, west)| {
            json!({
                "type": "Feature",
                "properties": {"name": format!("basin{i}")},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[west, 39.5], [west + 0.5, 39.5], [west + 0.5, 40.0], [west, 40.0], [west, 39.5]]]
                }
            })
        })
        .collect();
    let path = dir.join("basins.geojson");
    std::fs::write(
        &path,
        json!({"type": "FeatureCollection", "features": features}).to_string(),
    )
    .expect("failed to write geometry file");
    path
}
