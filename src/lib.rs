//! HySetter Core Library
//!
//! This library fetches and subsets hydroclimate datasets for an area of
//! interest (AOI) described by a declarative YAML configuration, and writes
//! every result to a predictable path under the project data directory.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - YAML configuration model, runtime settings and validation
//! - [`layout`] - Project directory layout and per-geometry file names
//! - [`geometry`] - GeoJSON model and the small amount of geometry math needed
//! - [`download`] - HTTP client with retry, rate limiting and staged writes
//! - [`services`] - Request builders for the external data services
//! - [`terrain`] - DEM decoding and derived rasters (slope, aspect, curvature)
//! - [`tasks`] - Data categories, dependency planning and the task engine
//! - [`progress`] - Progress bars for long-running categories

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod geometry;
pub mod layout;
pub mod progress;
pub mod services;
pub mod tasks;
pub mod terrain;

mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{Config, ConfigError, RunSettings, read_config, write_config};
pub use download::{DownloadError, HttpClient, RateLimiter, RetryPolicy};
pub use geometry::{BBox, Feature, FeatureCollection, Geometry, GeometryError};
pub use layout::{FilePaths, OutputDir};
pub use progress::ProgressReporter;
pub use services::{ServiceEndpoints, ServiceError, Services};
pub use tasks::{
    DataCategory, PlanError, RunSummary, TaskContext, TaskEngine, TaskError, TaskPlan,
    TaskRegistry, TaskReport, TaskStatus,
};
pub use terrain::{DemGrid, DerivedVariable, GeoTransform, TerrainError};
