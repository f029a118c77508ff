//! URL templates of user-configured remote rasters.
//!
//! A template may reference the request box through `{west}`, `{south}`,
//! `{east}`, `{north}` or `{bbox}` (`west,south,east,north`). Templates
//! without any placeholder point at a single file that is fetched once for
//! the whole AOI.

use crate::geometry::BBox;

const PLACEHOLDERS: [&str; 5] = ["{west}", "{south}", "{east}", "{north}", "{bbox}"];

/// Returns true when `url` references the request box.
#[must_use]
pub fn has_placeholders(url: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| url.contains(p))
}

/// Substitutes the bounds of `bbox` into `url`.
#[must_use]
pub fn fill_template(url: &str, bbox: &BBox) -> String {
    url.replace("{west}", &format!("{:.6}", bbox.west))
        .replace("{south}", &format!("{:.6}", bbox.south))
        .replace("{east}", &format!("{:.6}", bbox.east))
        .replace("{north}", &format!("{:.6}", bbox.north))
        .replace("{bbox}", &bbox.to_query())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_substitutes_every_placeholder() {
        let bbox = BBox::new(-105.5, 39.25, -105.0, 40.0);
        assert_eq!(
            fill_template("https://h/x?w={west}&s={south}&e={east}&n={north}", &bbox),
            "https://h/x?w=-105.500000&s=39.250000&e=-105.000000&n=40.000000"
        );
        assert_eq!(
            fill_template("https://h/x?bbox={bbox}", &bbox),
            "https://h/x?bbox=-105.500000,39.250000,-105.000000,40.000000"
        );
    }

    #[test]
    fn test_plain_url_is_untouched() {
        let url = "https://h/static/elevation.tif";
        assert!(!has_placeholders(url));
        assert_eq!(fill_template(url, &BBox::new(0.0, 0.0, 1.0, 1.0)), url);
        assert!(has_placeholders("https://h/x?b={bbox}"));
    }
}
