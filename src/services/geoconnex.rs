//! GeoConnex reference features: mainstem outlets.

use serde_json::Value;
use tracing::debug;

use super::{ServiceError, build_url};
use crate::download::HttpClient;

const SERVICE: &str = "GeoConnex";

/// Client for the GeoConnex OGC API.
#[derive(Debug, Clone, Copy)]
pub struct GeoConnex<'a> {
    http: &'a HttpClient,
    base: &'a str,
}

impl<'a> GeoConnex<'a> {
    /// Creates a client.
    #[must_use]
    pub fn new(http: &'a HttpClient, base: &'a str) -> Self {
        Self { http, base }
    }

    /// URL of one mainstem feature.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for a bad base URL.
    pub fn mainstem_url(&self, mainstem_id: i64) -> Result<String, ServiceError> {
        build_url(
            SERVICE,
            self.base,
            &["collections", "mainstems", "items", &mainstem_id.to_string()],
            &[("f", "json".to_string())],
        )
    }

    /// NHDPlus V2 COMID of the outlet of a mainstem.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the feature has no
    /// `outlet_nhdpv2_comid`.
    pub async fn outlet_comid(&self, mainstem_id: i64) -> Result<String, ServiceError> {
        let url = self.mainstem_url(mainstem_id)?;
        let value = self.http.get_json(&url).await?;
        let comid = outlet_from_feature(&value)
            .ok_or_else(|| ServiceError::not_found(SERVICE, format!("mainstem {mainstem_id} outlet")))?;
        debug!(mainstem_id, %comid, "mainstem outlet resolved");
        Ok(comid)
    }
}

/// The last path segment of `properties.outlet_nhdpv2_comid`, which is
/// served as a URI such as `https://geoconnex.us/nhdplusv2/comid/1234`.
fn outlet_from_feature(feature: &Value) -> Option<String> {
    let outlet = feature.pointer("/properties/outlet_nhdpv2_comid")?;
    let text = match outlet {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let comid = text.trim_end_matches('/').rsplit('/').next()?.trim();
    (!comid.is_empty()).then(|| comid.to_string())
}
