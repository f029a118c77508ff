//! User-Agent string sent with every service request.
//!
//! Public hydrology services ask clients to identify themselves; one format
//! keeps the traffic of every category recognizable.

/// Product token.
const PRODUCT: &str = "hysetter";

/// Default User-Agent for service requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (hydroclimate-data-tool; reqwest)")
}
