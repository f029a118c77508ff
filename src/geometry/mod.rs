//! GeoJSON model and the small amount of planar geometry the categories need.
//!
//! All coordinates are longitude/latitude in EPSG:4326. Only the GeoJSON
//! members hysetter reads are modeled; unknown members are ignored.

mod bbox;
mod error;
mod io;
mod ops;

pub use bbox::BBox;
pub(crate) use bbox::{METERS_PER_DEGREE, meters_per_degree_lon};
pub use error::GeometryError;
pub use io::{read_feature_collection, read_geometry_file, write_feature_collection};
pub use ops::RequestArea;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A longitude/latitude pair; extra ordinates (elevation, measure) are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.lon, self.lat].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ordinates = Vec::<f64>::deserialize(deserializer)?;
        match ordinates.as_slice() {
            [lon, lat, ..] => Ok(Self::new(*lon, *lat)),
            _ => Err(D::Error::custom(format!(
                "a position needs at least 2 ordinates, got {}",
                ordinates.len()
            ))),
        }
    }
}

/// Closed ring of a polygon; the first position is repeated at the end.
pub type Ring = Vec<Position>;

/// GeoJSON geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Single position (stations, dams).
    Point {
        /// Coordinates.
        coordinates: Position,
    },
    /// Several positions.
    MultiPoint {
        /// Coordinates.
        coordinates: Vec<Position>,
    },
    /// Polyline (flowlines).
    LineString {
        /// Coordinates.
        coordinates: Vec<Position>,
    },
    /// Several polylines.
    MultiLineString {
        /// Coordinates.
        coordinates: Vec<Vec<Position>>,
    },
    /// Exterior ring followed by holes.
    Polygon {
        /// Coordinates.
        coordinates: Vec<Ring>,
    },
    /// Several polygons.
    MultiPolygon {
        /// Coordinates.
        coordinates: Vec<Vec<Ring>>,
    },
}

impl Geometry {
    /// GeoJSON type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point { .. } => "Point",
            Self::MultiPoint { .. } => "MultiPoint",
            Self::LineString { .. } => "LineString",
            Self::MultiLineString { .. } => "MultiLineString",
            Self::Polygon { .. } => "Polygon",
            Self::MultiPolygon { .. } => "MultiPolygon",
        }
    }

    /// Returns true for `Polygon` and `MultiPolygon`.
    #[must_use]
    pub fn is_polygonal(&self) -> bool {
        matches!(self, Self::Polygon { .. } | Self::MultiPolygon { .. })
    }

    /// Every position of the geometry, rings and parts flattened.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Self::Point { coordinates } => vec![*coordinates],
            Self::MultiPoint { coordinates } | Self::LineString { coordinates } => {
                coordinates.clone()
            }
            Self::MultiLineString { coordinates } | Self::Polygon { coordinates } => {
                coordinates.iter().flatten().copied().collect()
            }
            Self::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().copied().collect()
            }
        }
    }

    /// Bounding box, or `None` for a geometry without positions.
    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_positions(self.positions())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum FeatureTag {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum FeatureCollectionTag {
    #[default]
    FeatureCollection,
}

/// GeoJSON feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default)]
    tag: FeatureTag,
    /// Feature identifier as served (string or number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Attribute table row; `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
    /// Geometry; `null` is allowed by GeoJSON but rejected for an AOI.
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// Creates a feature with a geometry and properties.
    #[must_use]
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            tag: FeatureTag::Feature,
            id: None,
            properties,
            geometry: Some(geometry),
        }
    }

    /// Property `name` rendered as a string (numbers are formatted).
    #[must_use]
    pub fn property_str(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// GeoJSON feature collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default)]
    tag: FeatureCollectionTag,
    /// Features in service order; the index is the geometry index of every
    /// per-geometry output file.
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Creates a collection from features.
    #[must_use]
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            tag: FeatureCollectionTag::FeatureCollection,
            features,
        }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true when there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Appends the features of `other`.
    pub fn extend(&mut self, other: Self) {
        self.features.extend(other.features);
    }

    /// Parses a GeoJSON document returned by a service.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Parse`] when the value is not a feature
    /// collection of supported geometries.
    pub fn from_value(value: Value) -> Result<Self, GeometryError> {
        serde_json::from_value(value).map_err(|source| GeometryError::Parse {
            origin: "service response".to_string(),
            source,
        })
    }

    /// Converts single-part multipolygons to polygons.
    pub fn multi_to_single(&mut self) {
        for feature in &mut self.features {
            if let Some(geometry) = feature.geometry.take() {
                feature.geometry = Some(ops::multi_to_single(geometry));
            }
        }
    }

    /// Ensures every feature has a polygonal geometry.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NotPolygonal`] naming the first offending
    /// feature index and geometry type.
    pub fn require_polygons(&self) -> Result<(), GeometryError> {
        for (index, feature) in self.features.iter().enumerate() {
            match &feature.geometry {
                Some(geometry) if geometry.is_polygonal() => {}
                other => {
                    return Err(GeometryError::NotPolygonal {
                        index,
                        found: other.as_ref().map_or("null", Geometry::type_name),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bounding box of every feature.
    #[must_use]
    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_positions(
            self.features
                .iter()
                .filter_map(|f| f.geometry.as_ref())
                .flat_map(Geometry::positions),
        )
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
