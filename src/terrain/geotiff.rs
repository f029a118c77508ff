//! GeoTIFF reading and writing for single-band DEM grids.
//!
//! Only the model tie point and pixel scale tags are used for placement;
//! rotated rasters (`ModelTransformationTag`) are not supported. Written
//! files carry a minimal GeoKey directory declaring EPSG:4326.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;
use tracing::debug;

use super::{DemGrid, GeoTransform, TerrainError};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey directory: version 1.1.0, geographic model, pixel-is-area,
/// EPSG:4326.
const GEO_KEYS_WGS84: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

/// Decoding limit for large DEM subsets.
const DECODE_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Reads the first band of a georeferenced TIFF.
///
/// # Errors
///
/// Returns [`TerrainError::Io`] when the file cannot be opened,
/// [`TerrainError::InvalidGeoTiff`] when placement tags are missing, and
/// [`TerrainError::Tiff`] for decode failures.
pub fn read_geotiff(path: &Path) -> Result<DemGrid, TerrainError> {
    let file = File::open(path).map_err(|e| TerrainError::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let mut limits = Limits::default();
    limits.decoding_buffer_size = DECODE_LIMIT_BYTES;
    limits.intermediate_buffer_size = DECODE_LIMIT_BYTES;
    limits.ifd_value_size = DECODE_LIMIT_BYTES;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;

    let tiepoint = decoder
        .get_tag_f64_vec(geo_tag(MODEL_TIEPOINT))
        .map_err(|_| TerrainError::invalid(path, "missing ModelTiepointTag"))?;
    let scale = decoder
        .get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE))
        .map_err(|_| TerrainError::invalid(path, "missing ModelPixelScaleTag"))?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(TerrainError::invalid(path, "truncated georeferencing tags"));
    }
    // Tie point [i, j, k, x, y, z] anchors raster (i, j) to model (x, y)
    let transform = GeoTransform {
        origin_lon: tiepoint[3] - tiepoint[0] * scale[0],
        origin_lat: tiepoint[4] + tiepoint[1] * scale[1],
        pixel_width: scale[0],
        pixel_height: scale[1],
    };

    let nodata = decoder
        .get_tag_ascii_string(geo_tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f32>().ok());

    let data = to_f32(decoder.read_image()?)?;
    debug!(path = %path.display(), width, height, ?nodata, "GeoTIFF read");
    DemGrid::new(width as usize, height as usize, data, transform, nodata)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_f32(result: DecodingResult) -> Result<Vec<f32>, TerrainError> {
    match result {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(f32::from).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(f32::from).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(f32::from).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(f32::from).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        #[allow(unreachable_patterns)]
        _ => Err(TerrainError::UnsupportedDataType(
            "unknown sample format".to_string(),
        )),
    }
}

/// Writes `grid` as a float32 GeoTIFF with placement and no-data tags,
/// creating parent directories.
///
/// # Errors
///
/// Returns [`TerrainError::Io`] or [`TerrainError::Tiff`].
pub fn write_geotiff(grid: &DemGrid, path: &Path) -> Result<(), TerrainError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TerrainError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| TerrainError::io(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;

    let width = u32::try_from(grid.width)
        .map_err(|_| TerrainError::InvalidGrid(format!("width {} too large", grid.width)))?;
    let height = u32::try_from(grid.height)
        .map_err(|_| TerrainError::InvalidGrid(format!("height {} too large", grid.height)))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;

    let t = grid.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_lon, t.origin_lat, 0.0];
    image
        .encoder()
        .write_tag(geo_tag(MODEL_PIXEL_SCALE), &scale[..])?;
    image
        .encoder()
        .write_tag(geo_tag(MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(geo_tag(GEO_KEY_DIRECTORY), &GEO_KEYS_WGS84[..])?;
    if let Some(nodata) = grid.nodata {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            nodata.to_string()
        };
        image
            .encoder()
            .write_tag(geo_tag(GDAL_NODATA), text.as_str())?;
    }

    image.write_data(&grid.data)?;
    debug!(path = %path.display(), width, height, "GeoTIFF written");
    Ok(())
}
