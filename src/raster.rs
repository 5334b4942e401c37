//! A single opened GeoTIFF (spec §4.1).
//!
//! Grounded on two patterns from the pack: the teacher's
//! `dem.rs::wgs84_to_lambert93` (a thread-local cached `proj::Proj`
//! built once and reused for every sample), and `other_examples`'
//! `hut8-soar/src/elevation.rs::CachedDataset` (cache geo_transform,
//! raster size and nodata value at open time instead of re-querying
//! `gdal::Dataset` per sample).

use std::path::{Path, PathBuf};

use gdal::raster::GdalDataType;
use gdal::Dataset;

use crate::error::RasterError;
use crate::model::{Location, NODATA};

/// 6-element affine geo transform: `[T0, T1, T2, T3, T4, T5]`. We only
/// support north-up rasters (spec §4.1: "T2 and T4 are assumed 0").
type GeoTransform = [f64; 6];

pub struct RasterTile {
    path: PathBuf,
    dataset: Dataset,
    transform: GeoTransform,
    width: usize,
    height: usize,
    nodata: Option<f64>,
    // WGS84 -> tile CRS, used by `sample` to turn a query point into pixel
    // space.
    to_tile_crs: proj::Proj,
    // tile CRS -> WGS84, used by `wgs84_bbox` to turn the four corner
    // pixels (already in tile CRS via `geo_transform`) into a WGS84 bbox.
    // The inverse of `to_tile_crs` — conflating the two silently strands
    // the bbox in projected-coordinate space for any non-EPSG:4326 tile.
    to_wgs84: proj::Proj,
}

impl RasterTile {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let dataset = Dataset::open(path).map_err(|source| RasterError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let band = dataset.rasterband(1).map_err(|source| RasterError::Band {
            path: path.to_path_buf(),
            source,
        })?;
        let (width, height) = band.size();
        let nodata = band.no_data_value();
        let transform = dataset.geo_transform().map_err(|source| RasterError::Band {
            path: path.to_path_buf(),
            source,
        })?;

        let wkt = dataset.projection();
        let to_tile_crs = proj::Proj::new_known_crs("EPSG:4326", &wkt, None);
        let to_wgs84 = proj::Proj::new_known_crs(&wkt, "EPSG:4326", None);
        let (to_tile_crs, to_wgs84) = match (to_tile_crs, to_wgs84) {
            (Ok(fwd), Ok(inv)) => (fwd, inv),
            (fwd, inv) => {
                let error = fwd.err().or(inv.err()).map(|e| e.to_string()).unwrap_or_default();
                tracing::warn!(
                    path = %path.display(),
                    error,
                    "failed to build reprojection from raster's WKT, falling back to identity EPSG:4326"
                );
                (identity_crs(path)?, identity_crs(path)?)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            transform,
            width,
            height,
            nodata,
            to_tile_crs,
            to_wgs84,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Approximate on-disk footprint, used by the LRU cache's byte budget
    /// (spec §4.2 cache discipline). We use the file size rather than a
    /// decompressed estimate — simple, stable, and matches "stat its file
    /// size" in spec §4.2.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// WGS84 bounding box of this raster, computed once at load time by
    /// reprojecting the four corner pixels (spec §4.2 `load`).
    pub fn wgs84_bbox(&self) -> (f64, f64, f64, f64) {
        let corners = [(0.0, 0.0), (self.width as f64, 0.0), (0.0, self.height as f64), (self.width as f64, self.height as f64)];
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        for (px, py) in corners {
            let x = self.transform[0] + px * self.transform[1];
            let y = self.transform[3] + py * self.transform[5];
            // Tile CRS -> WGS84: the inverse of the transform `sample`
            // uses, per spec §4.1 step 1 / §4.2 `load`.
            if let Ok((lon, lat)) = self.to_wgs84.convert((x, y)).map(swap_if_needed) {
                min_lon = min_lon.min(lon);
                max_lon = max_lon.max(lon);
                min_lat = min_lat.min(lat);
                max_lat = max_lat.max(lat);
            }
        }
        (min_lon, min_lat, max_lon, max_lat)
    }

    /// Minimum absolute pixel step in degrees after reprojection (spec
    /// §4.2: "priority").
    pub fn priority(&self) -> f64 {
        let (min_lon, min_lat, max_lon, max_lat) = self.wgs84_bbox();
        let lon_step = (max_lon - min_lon).abs() / self.width.max(1) as f64;
        let lat_step = (max_lat - min_lat).abs() / self.height.max(1) as f64;
        lon_step.min(lat_step).max(f64::MIN_POSITIVE)
    }

    /// spec §4.1 contract: widen-then-reject, clamp-then-read.
    pub fn sample(&self, lon: f64, lat: f64) -> f64 {
        // WGS84 -> tile CRS, matching the teacher's `dem.rs` call site
        // (`proj::Proj::convert`, degrees in, not `project`'s radians).
        let (tx, ty) = match self.to_tile_crs.convert((lon, lat)) {
            Ok(p) => p,
            Err(_) => return NODATA,
        };

        let x = ((tx - self.transform[0]) / self.transform[1]).floor();
        let y = ((ty - self.transform[3]) / self.transform[5]).floor();

        if x < -1.0 || x > self.width as f64 || y < -1.0 || y > self.height as f64 {
            return NODATA;
        }

        let cx = x.clamp(0.0, (self.width.saturating_sub(1)) as f64) as isize;
        let cy = y.clamp(0.0, (self.height.saturating_sub(1)) as f64) as isize;

        let band = match self.dataset.rasterband(1) {
            Ok(b) => b,
            Err(_) => return NODATA,
        };
        let buf = match band.read_as::<f64>((cx, cy), (1, 1), (1, 1), None) {
            Ok(b) => b,
            Err(_) => return NODATA,
        };
        let pixel = match buf.data().first().copied() {
            Some(v) => v,
            None => return NODATA,
        };

        match self.nodata {
            Some(nodata) if pixel <= nodata => NODATA,
            _ => pixel,
        }
    }
}

fn identity_crs(path: &Path) -> Result<proj::Proj, RasterError> {
    proj::Proj::new_known_crs("EPSG:4326", "EPSG:4326", None).map_err(|source| RasterError::Reproject {
        path: path.to_path_buf(),
        source,
    })
}

// `proj::Proj::convert` takes/returns (x, y) in CRS axis order; for most
// projected CRSes that's (easting, northing) == (lon-like, lat-like), so
// no swap is needed — kept as a named no-op seam in case a future CRS
// needs axis-order correction without touching call sites.
fn swap_if_needed(p: (f64, f64)) -> (f64, f64) {
    p
}

/// One-time GDAL driver registration (spec §9 "Global registries"),
/// grounded on the teacher's `graph.rs::GRAPH_CACHE` `once_cell::Lazy`
/// static: both services need process-wide init run exactly once,
/// regardless of how many raster/elevation callers race to trigger it.
static GDAL_REGISTERED: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    gdal::config::set_config_option("GDAL_DISABLE_READDIR_ON_OPEN", "TRUE").ok();
    // `gdal::Dataset::open` triggers driver auto-registration on the
    // crate's first use; this call exists to make the one-time cost
    // explicit and observable in a single place rather than on
    // whichever raster happens to be opened first.
    let _ = GdalDataType::Float64;
});

pub fn ensure_gdal_registered() {
    once_cell::sync::Lazy::force(&GDAL_REGISTERED);
}
