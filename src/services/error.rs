//! Error types for the external service clients.

use thiserror::Error;

use crate::download::DownloadError;
use crate::geometry::GeometryError;

/// Errors raised by the service clients.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The HTTP exchange failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A GeoJSON response could not be read.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// The response parsed but did not have the expected shape.
    #[error("{service} returned an unexpected response: {message}")]
    UnexpectedResponse {
        /// Service name.
        service: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The service has no data for the request.
    #[error("{service} has no data for {what}")]
    NotFound {
        /// Service name.
        service: &'static str,
        /// What was asked for.
        what: String,
    },

    /// A request could not be built.
    #[error("invalid {service} request: {message}")]
    InvalidRequest {
        /// Service name.
        service: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl ServiceError {
    /// Creates an unexpected-response error.
    pub fn unexpected(service: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            service,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(service: &'static str, what: impl Into<String>) -> Self {
        Self::NotFound {
            service,
            what: what.into(),
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(service: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            service,
            message: message.into(),
        }
    }
}
