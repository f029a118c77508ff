//! Point-in-polygon tests and request areas.

use super::bbox::{METERS_PER_DEGREE, meters_per_degree_lon};
use super::{BBox, Feature, Geometry, GeometryError, Position, Ring};

impl Geometry {
    /// Returns true when `(lon, lat)` lies inside a polygonal geometry.
    ///
    /// Ray casting against every ring; a point inside a hole is outside.
    /// Non-polygonal geometries contain nothing.
    #[must_use]
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        match self {
            Self::Polygon { coordinates } => polygon_contains(coordinates, lon, lat),
            Self::MultiPolygon { coordinates } => coordinates
                .iter()
                .any(|polygon| polygon_contains(polygon, lon, lat)),
            _ => false,
        }
    }

    /// Returns true when any vertex of `self` lies inside `area`.
    #[must_use]
    pub fn any_vertex_within(&self, area: &Geometry) -> bool {
        self.positions()
            .iter()
            .any(|p| area.contains_point(p.lon, p.lat))
    }

    /// Distance in meters from `(lon, lat)` to the nearest polygon edge.
    ///
    /// Uses a local equirectangular projection, which is accurate for the
    /// buffer distances a config asks for. Returns `f64::INFINITY` for
    /// non-polygonal geometries.
    #[must_use]
    pub fn boundary_distance_m(&self, lon: f64, lat: f64) -> f64 {
        let rings: Vec<&Ring> = match self {
            Self::Polygon { coordinates } => coordinates.iter().collect(),
            Self::MultiPolygon { coordinates } => coordinates.iter().flatten().collect(),
            _ => return f64::INFINITY,
        };
        let kx = meters_per_degree_lon(lat);
        let ky = METERS_PER_DEGREE;
        rings
            .iter()
            .flat_map(|ring| ring.windows(2))
            .map(|edge| {
                segment_distance(
                    ((edge[0].lon - lon) * kx, (edge[0].lat - lat) * ky),
                    ((edge[1].lon - lon) * kx, (edge[1].lat - lat) * ky),
                )
            })
            .fold(f64::INFINITY, f64::min)
    }
}

fn polygon_contains(rings: &[Ring], lon: f64, lat: f64) -> bool {
    let Some((exterior, holes)) = rings.split_first() else {
        return false;
    };
    ring_contains(exterior, lon, lat) && !holes.iter().any(|hole| ring_contains(hole, lon, lat))
}

fn ring_contains(ring: &[Position], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    let mut j = ring.len().saturating_sub(1);
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.lat > lat) != (b.lat > lat)
            && lon < (b.lon - a.lon) * (lat - a.lat) / (b.lat - a.lat) + a.lon
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from the origin to segment `a`-`b`, in the segment's units.
fn segment_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (-(a.0 * dx + a.1 * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (a.0 + t * dx).hypot(a.1 + t * dy)
}

/// A single-part `MultiPolygon` becomes a `Polygon`; others are unchanged.
pub(crate) fn multi_to_single(geometry: Geometry) -> Geometry {
    match geometry {
        Geometry::MultiPolygon { mut coordinates } if coordinates.len() == 1 => {
            Geometry::Polygon {
                coordinates: coordinates.remove(0),
            }
        }
        other => other,
    }
}

/// The area a category requests data for, derived from one AOI feature.
///
/// Without crop the feature is replaced by its bounding box. A positive
/// buffer grows the request box and widens [`RequestArea::contains`] by the
/// buffer distance.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestArea {
    /// Polygon that masks the request (the box itself without crop).
    pub geometry: Geometry,
    /// Box sent to the services.
    pub bbox: BBox,
    /// Buffer in meters around `geometry`.
    pub buffer_m: f64,
}

impl RequestArea {
    /// Builds the request area of feature `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::MissingGeometry`] when the feature has no
    /// geometry or no positions.
    pub fn for_feature(
        feature: &Feature,
        index: usize,
        crop: bool,
        buffer_m: f64,
    ) -> Result<Self, GeometryError> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or(GeometryError::MissingGeometry { index })?;
        let bbox = geometry
            .bbox()
            .ok_or(GeometryError::MissingGeometry { index })?;
        let buffer_m = buffer_m.max(0.0);
        let geometry = if crop {
            geometry.clone()
        } else {
            bbox.to_polygon()
        };
        Ok(Self {
            geometry,
            bbox: bbox.buffered(buffer_m),
            buffer_m,
        })
    }

    /// Returns true when the position is inside the geometry or within the
    /// buffer distance of its boundary.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if self.geometry.contains_point(lon, lat) {
            return true;
        }
        self.buffer_m > 0.0
            && self.bbox.contains(lon, lat)
            && self.geometry.boundary_distance_m(lon, lat) <= self.buffer_m
    }
}
