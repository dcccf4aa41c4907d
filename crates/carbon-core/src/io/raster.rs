//! GeoTIFF reading and writing on top of the `tiff` codec.
//!
//! Georeferencing travels in four tags: ModelPixelScale, ModelTiepoint,
//! GeoKeyDirectory (EPSG code only) and GDAL_NODATA.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::crs::{Crs, EPSG_WGS84};
use crate::error::{CarbonError, Result, Stage};
use crate::grid::{DensityGrid, GeoTransform, LandCoverGrid};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_TYPE: u16 = 3072;
const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read a single-band integer GeoTIFF as a land-cover grid.
pub fn read_land_cover(path: &Path) -> Result<LandCoverGrid> {
    let file = File::open(path)
        .map_err(|e| CarbonError::input(Stage::ReadGrid, path, e.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (width, height) = decoder.dimensions()?;
    if width == 0 || height == 0 {
        return Err(CarbonError::input(Stage::ReadGrid, path, "image has no pixels"));
    }

    let transform = read_transform(&mut decoder)?.unwrap_or_else(|| {
        warn!(path = %path.display(), "no pixel scale / tiepoint tags; assuming unit pixels");
        GeoTransform::new(0.0, 0.0, 1.0, -1.0)
    });
    let crs = read_crs(&mut decoder)?;
    let nodata = read_nodata(&mut decoder)?;

    let data: Vec<i32> = match decoder.read_image()? {
        DecodingResult::U8(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::I32(v) => v,
        DecodingResult::U32(v) => v
            .into_iter()
            .map(|x| i32::try_from(x).unwrap_or(i32::MAX))
            .collect(),
        _ => {
            return Err(CarbonError::input(
                Stage::ReadGrid,
                path,
                "unsupported sample type (expected 8/16/32-bit integers)",
            ))
        }
    };
    let (w, h) = (width as usize, height as usize);
    if data.len() != w * h {
        return Err(CarbonError::input(
            Stage::ReadGrid,
            path,
            format!("expected {} samples, found {} (multi-band images are not supported)", w * h, data.len()),
        ));
    }

    debug!(width = w, height = h, %crs, ?nodata, "read land-cover grid");
    Ok(LandCoverGrid::new(w, h, data, transform, crs).with_nodata(nodata.map(|v| v as i32)))
}

fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    let scale = match decoder.find_tag(tag(TAG_MODEL_PIXEL_SCALE))? {
        Some(v) => v.into_f64_vec()?,
        None => return Ok(None),
    };
    let tie = match decoder.find_tag(tag(TAG_MODEL_TIEPOINT))? {
        Some(v) => v.into_f64_vec()?,
        None => return Ok(None),
    };
    if scale.len() < 2 || tie.len() < 6 {
        return Ok(None);
    }
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
    Ok(Some(GeoTransform::new(x - i * sx, y + j * sy, sx, -sy)))
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Crs> {
    let keys = match decoder.find_tag(tag(TAG_GEO_KEY_DIRECTORY))? {
        Some(v) => v.into_u16_vec()?,
        None => return Ok(Crs::Unknown),
    };
    Ok(crs_from_geokeys(&keys))
}

/// EPSG code from a GeoKeyDirectory; projected key wins over geographic.
fn crs_from_geokeys(keys: &[u16]) -> Crs {
    if keys.len() < 4 {
        return Crs::Unknown;
    }
    let entries: Vec<&[u16]> = keys[4..].chunks_exact(4).collect();
    let inline_value = |id: u16| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3])
            .filter(|&v| v != 0 && v != USER_DEFINED)
    };
    match inline_value(KEY_PROJECTED_TYPE).or_else(|| inline_value(KEY_GEOGRAPHIC_TYPE)) {
        Some(code) => Crs::Epsg(u32::from(code)),
        None => Crs::Unknown,
    }
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let Some(value) = decoder.find_tag(tag(TAG_GDAL_NODATA))? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(char::from(0)).trim().parse::<f64>().ok())
}

// ── Writing ──────────────────────────────────────────────────────────────────

fn geokeys_for(crs: &Crs) -> Vec<u16> {
    let mut keys = vec![1, 1, 0, 0];
    let mut push = |id: u16, value: u16| keys.extend_from_slice(&[id, 0, 1, value]);
    match crs.epsg().and_then(|n| u16::try_from(n).ok()) {
        Some(code) if u32::from(code) == EPSG_WGS84 || (4000..5000).contains(&code) => {
            push(KEY_MODEL_TYPE, MODEL_GEOGRAPHIC);
            push(KEY_RASTER_TYPE, RASTER_PIXEL_IS_AREA);
            push(KEY_GEOGRAPHIC_TYPE, code);
        }
        Some(code) => {
            push(KEY_MODEL_TYPE, MODEL_PROJECTED);
            push(KEY_RASTER_TYPE, RASTER_PIXEL_IS_AREA);
            push(KEY_PROJECTED_TYPE, code);
        }
        None => push(KEY_RASTER_TYPE, RASTER_PIXEL_IS_AREA),
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    keys
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| CarbonError::input(Stage::WriteOutputs, dir, e.to_string()))?;
    }
    let file = File::create(path)
        .map_err(|e| CarbonError::input(Stage::WriteOutputs, path, e.to_string()))?;
    Ok(BufWriter::new(file))
}

/// Write the density grid as a Float32 GeoTIFF aligned to `transform`.
pub fn write_density(path: &Path, grid: &DensityGrid, transform: &GeoTransform, crs: &Crs) -> Result<()> {
    let mut encoder = TiffEncoder::new(create(path)?)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(grid.width as u32, grid.height as u32)?;
    let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
    let tie = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    let keys = geokeys_for(crs);
    let nodata = format!("{}", grid.nodata);
    image.encoder().write_tag(tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(TAG_MODEL_TIEPOINT), &tie[..])?;
    image.encoder().write_tag(tag(TAG_GEO_KEY_DIRECTORY), &keys[..])?;
    image.encoder().write_tag(tag(TAG_GDAL_NODATA), nodata.as_str())?;
    image.write_data(&grid.data)?;
    debug!(path = %path.display(), "wrote density raster");
    Ok(())
}

/// Write a land-cover grid as a UInt16 GeoTIFF. Values outside 0..=65535
/// are clamped.
pub fn write_land_cover(path: &Path, grid: &LandCoverGrid) -> Result<()> {
    let mut encoder = TiffEncoder::new(create(path)?)?;
    let mut image = encoder.new_image::<colortype::Gray16>(grid.width as u32, grid.height as u32)?;
    let t = &grid.transform;
    let scale = [t.pixel_width, -t.pixel_height, 0.0];
    let tie = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let keys = geokeys_for(&grid.crs);
    image.encoder().write_tag(tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
    image.encoder().write_tag(tag(TAG_MODEL_TIEPOINT), &tie[..])?;
    image.encoder().write_tag(tag(TAG_GEO_KEY_DIRECTORY), &keys[..])?;
    if let Some(nd) = grid.nodata {
        let nodata = nd.to_string();
        image.encoder().write_tag(tag(TAG_GDAL_NODATA), nodata.as_str())?;
    }
    let data: Vec<u16> = grid.data.iter().map(|&v| v.clamp(0, u16::MAX as i32) as u16).collect();
    image.write_data(&data)?;
    Ok(())
}

/// CRS of a GeoTIFF without decoding its pixels.
pub fn read_raster_crs(path: &Path) -> Result<Crs> {
    let file = File::open(path)
        .map_err(|e| CarbonError::input(Stage::ReadGrid, path, e.to_string()))?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    read_crs(&mut decoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geokeys_round_trip_projected_and_geographic() {
        assert_eq!(crs_from_geokeys(&geokeys_for(&Crs::Epsg(32636))), Crs::Epsg(32636));
        assert_eq!(crs_from_geokeys(&geokeys_for(&Crs::Epsg(4326))), Crs::Epsg(4326));
        assert_eq!(crs_from_geokeys(&geokeys_for(&Crs::Unknown)), Crs::Unknown);
    }

    #[test]
    fn geokey_header_counts_entries() {
        let keys = geokeys_for(&Crs::Epsg(6933));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(keys.len(), 4 + 3 * 4);
    }

    #[test]
    fn user_defined_or_truncated_keys_are_unknown() {
        assert_eq!(crs_from_geokeys(&[1, 1, 0, 1, KEY_PROJECTED_TYPE, 0, 1, USER_DEFINED]), Crs::Unknown);
        assert_eq!(crs_from_geokeys(&[1, 1]), Crs::Unknown);
    }
}
