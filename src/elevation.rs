//! Spatial index of GeoTIFF tiles + byte-budgeted LRU cache of opened
//! rasters + point/segment elevation queries (spec §4.2).

use std::path::{Path, PathBuf};

use lru::LruCache;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::ElevationError;
use crate::model::{Location, NODATA};
use crate::raster::{ensure_gdal_registered, RasterTile};

/// One entry in the R-tree: a raster's WGS84 bbox plus enough metadata
/// to rank and open it (spec §3 `TileEntry`).
#[derive(Debug, Clone)]
struct TileEntry {
    bbox: (f64, f64, f64, f64), // (min_lon, min_lat, max_lon, max_lat)
    priority: f64,
    filename: PathBuf,
}

impl RTreeObject for TileEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.0, self.bbox.1],
            [self.bbox.2, self.bbox.3],
        )
    }
}

impl TileEntry {
    fn contains(&self, loc: Location) -> bool {
        loc.lon >= self.bbox.0
            && loc.lon <= self.bbox.2
            && loc.lat >= self.bbox.1
            && loc.lat <= self.bbox.3
    }

    fn intersects_bbox(&self, other: (f64, f64, f64, f64)) -> bool {
        self.bbox.0 <= other.2 && self.bbox.2 >= other.0 && self.bbox.1 <= other.3 && self.bbox.3 >= other.1
    }
}

/// One elevation sample produced by [`ElevationService::interpolate`].
#[derive(Debug, Clone, Copy)]
pub struct ElevationSample {
    pub location: Location,
    pub ele: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ElevationCounters {
    pub found_custom: u64,
    pub found_srtm: u64,
    pub found_gmted: u64,
}

/// Opened raster handles kept in LRU order by `lru::LruCache` (grounded
/// on the teacher's `graph.rs::GRAPH_CACHE`), evicted on a byte budget
/// rather than the teacher's fixed entry count (spec §4.2 "Cache
/// discipline" sizes the cache in bytes, not tile count).
struct TileCache {
    limit_bytes: u64,
    used_bytes: u64,
    open: LruCache<PathBuf, RasterTile>,
}

impl TileCache {
    fn new(limit_bytes: u64) -> Self {
        Self {
            limit_bytes,
            used_bytes: 0,
            // The entry-count cap is effectively unbounded: the byte
            // budget below is what actually governs eviction.
            open: LruCache::unbounded(),
        }
    }

    fn evict_one(&mut self) -> bool {
        match self.open.pop_lru() {
            Some((_, tile)) => {
                self.used_bytes = self.used_bytes.saturating_sub(tile.file_size());
                true
            }
            None => false,
        }
    }

    /// spec §4.2 `load_tiff`.
    fn load(&mut self, path: &Path) -> Option<&RasterTile> {
        if self.open.contains(path) {
            return self.open.get(path);
        }

        let tile = match RasterTile::open(path) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to open raster tile");
                return None;
            }
        };
        let size = tile.file_size();

        while !self.open.is_empty() && self.used_bytes + size > self.limit_bytes {
            if !self.evict_one() {
                break;
            }
        }

        self.used_bytes += size;
        self.open.put(path.to_path_buf(), tile);
        self.open.get(path)
    }
}

pub struct ElevationService {
    index: RTree<TileEntry>,
    cache: TileCache,
    initialized: bool,
    pub counters: ElevationCounters,
}

impl ElevationService {
    pub fn new(cache_limit_bytes: u64) -> Self {
        Self {
            index: RTree::new(),
            cache: TileCache::new(cache_limit_bytes),
            initialized: false,
            counters: ElevationCounters::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// spec §4.2 `load`: recursively collect `.tif`/`.tiff`/`.gtiff`
    /// files under each path (or use the path directly if it is itself a
    /// regular file), index each by its WGS84 bbox + priority.
    pub fn load(&mut self, paths: &[PathBuf]) -> Result<(), ElevationError> {
        ensure_gdal_registered();

        let mut entries = Vec::new();
        for path in paths {
            for file in collect_raster_files(path)? {
                match RasterTile::open(&file) {
                    Ok(tile) => {
                        let (min_lon, min_lat, max_lon, max_lat) = tile.wgs84_bbox();
                        let priority = tile.priority();
                        entries.push(TileEntry {
                            bbox: (min_lon, min_lat, max_lon, max_lat),
                            priority,
                            filename: file.clone(),
                        });
                        // The tile handle opened purely to compute bbox/
                        // priority is dropped here (spec §4.2: "Close the
                        // tile handle at end of load"); the cache reopens
                        // it lazily on first query.
                    }
                    Err(err) => {
                        tracing::warn!(path = %file.display(), error = %err, "skipping unreadable raster tile");
                    }
                }
            }
        }

        self.index = RTree::bulk_load(entries);
        self.initialized = true;
        Ok(())
    }

    fn best_match(&self, loc: Location) -> Option<&TileEntry> {
        self.index
            .locate_all_at_point(&[loc.lon, loc.lat])
            .filter(|entry| entry.contains(loc))
            .min_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// spec §4.2 `elevation`.
    pub fn elevation(&mut self, loc: Location, count: bool) -> f64 {
        let filename = match self.best_match(loc) {
            Some(entry) => entry.filename.clone(),
            None => return NODATA,
        };

        let tile = match self.cache.load(&filename) {
            Some(t) => t,
            None => return NODATA,
        };
        let value = tile.sample(loc.lon, loc.lat);

        if count && value != NODATA {
            let name = filename
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_lowercase();
            if name.starts_with("srtm") {
                self.counters.found_srtm += 1;
            } else if name.contains("gmted") {
                self.counters.found_gmted += 1;
            } else {
                self.counters.found_custom += 1;
            }
        }

        value
    }

    /// spec §4.2 `interpolate`. Returns the interior samples plus the
    /// final `to` point; the formula for `steps` is intentionally
    /// reproduced verbatim from the spec rather than "fixed", per
    /// DESIGN.md's open-question resolution.
    pub fn interpolate(&mut self, from: Location, to: Location) -> Vec<ElevationSample> {
        let bbox = (
            from.lon.min(to.lon),
            from.lat.min(to.lat),
            from.lon.max(to.lon),
            from.lat.max(to.lat),
        );

        let best = self
            .index
            .iter()
            .filter(|entry| entry.intersects_bbox(bbox))
            .min_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap_or(std::cmp::Ordering::Equal))
            .cloned();

        let step = match best {
            Some(entry) => entry.priority,
            None => return Vec::new(),
        };

        let dx = to.lon - from.lon;
        let dy = to.lat - from.lat;
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return vec![ElevationSample {
                location: to,
                ele: self.elevation(to, false),
            }];
        }

        let nx = dx / len;
        let ny = dy / len;
        let sx = step * nx;
        let sy = step * ny;

        if sx == 0.0 {
            return vec![ElevationSample {
                location: to,
                ele: self.elevation(to, false),
            }];
        }

        // spec §4.2: `steps = floor(dx / sx)`, deliberately not
        // `floor(len / step)` — see DESIGN.md open question #2.
        let steps = (dx / sx).floor();
        let steps = if steps.is_finite() && steps > 0.0 {
            steps as i64
        } else {
            0
        };

        let mut out = Vec::with_capacity((steps + 1) as usize);
        for s in 0..steps {
            let loc = Location::new(from.lon + s as f64 * sx, from.lat + s as f64 * sy);
            out.push(ElevationSample {
                location: loc,
                ele: self.elevation(loc, false),
            });
        }
        out.push(ElevationSample {
            location: to,
            ele: self.elevation(to, false),
        });
        out
    }
}

fn collect_raster_files(path: &Path) -> Result<Vec<PathBuf>, ElevationError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if matches!(ext.as_str(), "tif" | "tiff" | "gtiff") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(bbox: (f64, f64, f64, f64), priority: f64, name: &str) -> TileEntry {
        TileEntry {
            bbox,
            priority,
            filename: PathBuf::from(name),
        }
    }

    #[test]
    fn finest_priority_wins_among_overlapping_tiles() {
        let coarse = entry((0.0, 0.0, 2.0, 2.0), 0.1, "coarse.tif");
        let fine = entry((0.0, 0.0, 2.0, 2.0), 0.01, "fine.tif");
        let tree: RTree<TileEntry> = RTree::bulk_load(vec![coarse, fine]);
        let loc = Location::new(1.0, 1.0);
        let best = tree
            .locate_all_at_point(&[loc.lon, loc.lat])
            .filter(|e| e.contains(loc))
            .min_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap())
            .unwrap();
        assert_eq!(best.filename, PathBuf::from("fine.tif"));
    }

    #[test]
    fn interpolate_zero_length_segment_returns_single_endpoint() {
        let mut service = ElevationService::new(1024);
        let p = Location::new(1.0, 1.0);
        service.index = RTree::bulk_load(vec![entry((0.0, 0.0, 2.0, 2.0), 0.01, "t.tif")]);
        service.initialized = true;
        let samples = service.interpolate(p, p);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].location, p);
    }

    #[test]
    fn interpolate_without_matching_tile_is_empty() {
        let mut service = ElevationService::new(1024);
        let from = Location::new(-10.0, -10.0);
        let to = Location::new(-9.0, -9.0);
        let samples = service.interpolate(from, to);
        assert!(samples.is_empty());
    }
}
