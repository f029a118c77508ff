//! Longitude/latitude bounding boxes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Geometry, Position};

/// Meters per degree of latitude (and of longitude at the equator).
pub(crate) const METERS_PER_DEGREE: f64 = 111_320.0;

/// Axis-aligned box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

impl BBox {
    /// Creates a box from its bounds.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Smallest box holding every position, or `None` for no positions.
    #[must_use]
    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Option<Self> {
        positions.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self::new(p.lon, p.lat, p.lon, p.lat),
                Some(b) => Self::new(
                    b.west.min(p.lon),
                    b.south.min(p.lat),
                    b.east.max(p.lon),
                    b.north.max(p.lat),
                ),
            })
        })
    }

    /// Width in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Returns true when the position lies inside or on the box.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.west..=self.east).contains(&lon) && (self.south..=self.north).contains(&lat)
    }

    /// Grows the box by `meters` on every side.
    ///
    /// Meters are converted to degrees at the box's mid latitude; latitudes
    /// are clamped to the poles.
    #[must_use]
    pub fn buffered(&self, meters: f64) -> Self {
        if meters <= 0.0 {
            return *self;
        }
        let dlat = meters / METERS_PER_DEGREE;
        let dlon = meters / meters_per_degree_lon(self.center().lat);
        Self::new(
            (self.west - dlon).max(-180.0),
            (self.south - dlat).max(-90.0),
            (self.east + dlon).min(180.0),
            (self.north + dlat).min(90.0),
        )
    }

    /// Width and height in meters at the box's mid latitude.
    #[must_use]
    pub fn size_m(&self) -> (f64, f64) {
        (
            self.width() * meters_per_degree_lon(self.center().lat),
            self.height() * METERS_PER_DEGREE,
        )
    }

    /// The box as a closed polygon.
    #[must_use]
    pub fn to_polygon(&self) -> Geometry {
        let ring = vec![
            Position::new(self.west, self.south),
            Position::new(self.east, self.south),
            Position::new(self.east, self.north),
            Position::new(self.west, self.north),
            Position::new(self.west, self.south),
        ];
        Geometry::Polygon {
            coordinates: vec![ring],
        }
    }

    /// Bounds formatted with six decimals, comma separated (`w,s,e,n`).
    #[must_use]
    pub fn to_query(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.west, self.south, self.east, self.north
        )
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Meters per degree of longitude at `lat`.
pub(crate) fn meters_per_degree_lon(lat: f64) -> f64 {
    (METERS_PER_DEGREE * lat.to_radians().cos()).max(1.0)
}
