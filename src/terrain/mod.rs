//! DEM rasters and the variables derived from them.
//!
//! A [`DemGrid`] is a north-up float grid in EPSG:4326 degrees, read from
//! and written to GeoTIFF by [`read_geotiff`] and [`write_geotiff`]. The
//! derivatives use 3x3 windows with cell sizes converted to meters at
//! each row's latitude. Edge cells and cells next to no-data are NaN.

mod derive;
mod error;
mod geotiff;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::TerrainError;
pub use geotiff::{read_geotiff, write_geotiff};

use crate::geometry::RequestArea;

/// A raster computed from the DEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedVariable {
    /// Steepest gradient in degrees.
    Slope,
    /// Downslope direction in degrees clockwise from north.
    Aspect,
    /// Zevenbergen-Thorne curvature, positive for convex cells.
    Curvature,
}

impl DerivedVariable {
    /// Name used in config files and output file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slope => "slope",
            Self::Aspect => "aspect",
            Self::Curvature => "curvature",
        }
    }
}

impl fmt::Display for DerivedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of the upper-left corner and the size of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Longitude of the west edge.
    pub origin_lon: f64,
    /// Latitude of the north edge.
    pub origin_lat: f64,
    /// Pixel width in degrees.
    pub pixel_width: f64,
    /// Pixel height in degrees (positive, rows go south).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Longitude and latitude of the center of `(col, row)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_lon + (col as f64 + 0.5) * self.pixel_width,
            self.origin_lat - (row as f64 + 0.5) * self.pixel_height,
        )
    }
}

/// A single-band elevation grid, row major from the north-west corner.
#[derive(Debug, Clone, PartialEq)]
pub struct DemGrid {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Cell values, `width * height` long.
    pub data: Vec<f32>,
    /// Georeferencing.
    pub transform: GeoTransform,
    /// Value marking missing cells, if the source declared one.
    pub nodata: Option<f32>,
}

impl DemGrid {
    /// Creates a grid.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidGrid`] when `data` does not hold
    /// `width * height` values or the pixel size is not positive.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        nodata: Option<f32>,
    ) -> Result<Self, TerrainError> {
        if data.len() != width * height {
            return Err(TerrainError::InvalidGrid(format!(
                "expected {} cells for {width}x{height}, found {}",
                width * height,
                data.len()
            )));
        }
        if !(transform.pixel_width > 0.0 && transform.pixel_height > 0.0) {
            return Err(TerrainError::InvalidGrid(format!(
                "pixel size must be positive, found {}x{}",
                transform.pixel_width, transform.pixel_height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            transform,
            nodata,
        })
    }

    /// The value at `(col, row)`, or `None` outside the grid and for
    /// no-data or NaN cells.
    #[must_use]
    pub fn value(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let v = self.data[row * self.width + col];
        if v.is_nan() || self.nodata.is_some_and(|nd| v == nd) {
            None
        } else {
            Some(v)
        }
    }

    /// Sets every cell whose center falls outside `area` to no-data.
    ///
    /// Grids without a declared no-data value switch to NaN. Returns the
    /// number of cells masked.
    pub fn mask_outside(&mut self, area: &RequestArea) -> usize {
        let fill = *self.nodata.get_or_insert(f32::NAN);
        let mut masked = 0;
        for row in 0..self.height {
            for col in 0..self.width {
                let (lon, lat) = self.transform.cell_center(col, row);
                if !area.contains(lon, lat) {
                    self.data[row * self.width + col] = fill;
                    masked += 1;
                }
            }
        }
        masked
    }

    /// Computes `variable` on a grid of the same shape with NaN no-data.
    #[must_use]
    pub fn derive(&self, variable: DerivedVariable) -> DemGrid {
        let data = match variable {
            DerivedVariable::Slope => derive::slope(self),
            DerivedVariable::Aspect => derive::aspect(self),
            DerivedVariable::Curvature => derive::curvature(self),
        };
        DemGrid {
            width: self.width,
            height: self.height,
            data,
            transform: self.transform,
            nodata: Some(f32::NAN),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::geometry::{BBox, Feature};

    pub(super) fn grid(width: usize, height: usize, data: Vec<f32>) -> DemGrid {
        let transform = GeoTransform {
            origin_lon: 0.0,
            origin_lat: 1.0,
            pixel_width: 0.25,
            pixel_height: 0.25,
        };
        DemGrid::new(width, height, data, transform, Some(-9999.0)).unwrap()
    }

    #[test]
    fn test_derived_variable_names() {
        let parsed: Vec<DerivedVariable> =
            serde_yaml::from_str("[slope, aspect, curvature]").unwrap();
        assert_eq!(
            parsed,
            vec![
                DerivedVariable::Slope,
                DerivedVariable::Aspect,
                DerivedVariable::Curvature
            ]
        );
        assert_eq!(DerivedVariable::Curvature.to_string(), "curvature");
    }

    #[test]
    fn test_new_rejects_wrong_cell_count() {
        let transform = GeoTransform {
            origin_lon: 0.0,
            origin_lat: 0.0,
            pixel_width: 1.0,
            pixel_height: 1.0,
        };
        let err = DemGrid::new(2, 2, vec![0.0; 3], transform, None).unwrap_err();
        assert!(matches!(err, TerrainError::InvalidGrid(_)));
    }

    #[test]
    fn test_value_hides_nodata() {
        let g = grid(2, 1, vec![-9999.0, 5.0]);
        assert_eq!(g.value(0, 0), None);
        assert_eq!(g.value(1, 0), Some(5.0));
        assert_eq!(g.value(2, 0), None);
    }

    #[test]
    fn test_mask_outside_keeps_cells_inside_area() {
        // 4x4 cells of 0.25 degrees covering [0,1]x[0,1]
        let mut g = grid(4, 4, vec![1.0; 16]);
        let feature = Feature::new(BBox::new(0.0, 0.5, 0.5, 1.0).to_polygon(), Map::new());
        let area = RequestArea::for_feature(&feature, 0, true, 0.0).unwrap();

        let masked = g.mask_outside(&area);

        assert_eq!(masked, 12);
        assert_eq!(g.value(0, 0), Some(1.0));
        assert_eq!(g.value(1, 1), Some(1.0));
        assert_eq!(g.value(2, 0), None);
        assert_eq!(g.value(0, 2), None);
    }
}
