//! EPA StreamCat catchment metrics.

use serde_json::{Value, json};
use tracing::instrument;

use super::{ServiceError, build_url};
use crate::download::HttpClient;

const SERVICE: &str = "StreamCat";

/// Largest number of COMIDs sent in one request.
pub const MAX_COMIDS_PER_REQUEST: usize = 500;

/// StreamCat client.
#[derive(Debug, Clone, Copy)]
pub struct StreamCat<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> StreamCat<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// URL of catchment-level `names` for `comids`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn metrics_url(&self, names: &[String], comids: &[String]) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.base,
            &[],
            &[
                ("name", names.join(",").to_lowercase()),
                ("aoi", "cat".to_string()),
                ("comid", comids.join(",")),
            ],
        )
    }

    /// Catchment metrics for `comids`, fetched in chunks and merged into
    /// one `{"items": [...]}` document.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnexpectedResponse`] when a chunk has no
    /// `items` array.
    #[instrument(level = "debug", skip_all, fields(metrics = names.len(), comids = comids.len()))]
    pub async fn metrics(&self, names: &[String], comids: &[String]) -> Result<Value, ServiceError> {
        let mut items = Vec::new();
        for chunk in comids.chunks(MAX_COMIDS_PER_REQUEST) {
            let url = self.metrics_url(names, chunk)?;
            let mut response = self.http.get_json(&url).await?;
            let Some(Value::Array(rows)) = response.get_mut("items").map(Value::take) else {
                return Err(ServiceError::unexpected(SERVICE, "missing `items` array"));
            };
            items.extend(rows);
        }
        Ok(json!({ "items": items }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::mock_services;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    #[test]
    fn test_metrics_url_lowercases_names() {
        let services = mock_services("http://localhost:1");
        let url = services
            .streamcat()
            .metrics_url(&["FRST2019".to_string()], &["1".to_string(), "2".to_string()])
            .unwrap();
        assert!(url.contains("name=frst2019"), "got {url}");
        assert!(url.contains("aoi=cat"), "got {url}");
        assert!(url.contains("comid=1%2C2"), "got {url}");
    }

    #[tokio::test]
    async fn test_metrics_merges_chunks() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/streamcat"))
            .and(query_param("aoi", "cat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"items": [{"comid": 1, "frst2019cat": 12.5}]})),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let comids: Vec<String> = (0..600).map(|i| i.to_string()).collect();
        let merged = services
            .streamcat()
            .metrics(&["frst2019".to_string()], &comids)
            .await
            .unwrap();
        assert_eq!(merged["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metrics_rejects_unexpected_shape() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "bad name"})))
            .mount(&mock_server)
            .await;

        let services = mock_services(&mock_server.uri());
        let err = services
            .streamcat()
            .metrics(&["nope".to_string()], &["1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedResponse { .. }));
    }
}
