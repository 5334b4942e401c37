//! Global 1x1 degree grid index over polygon sets, used to assign each
//! node zero or more area names (spec §4.3).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use geo::{BooleanOps, Contains, Intersects};
use geo_types::{Geometry, MultiPolygon, Polygon};

use crate::error::AreaError;
use crate::model::{AreaId, GridCell, Location, AREA_MULTIPLE, AREA_NONE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoType {
    Wkt,
    GeoJson,
}

pub struct AreaMappingConfig {
    pub path: PathBuf,
    pub id_col: usize,
    pub geo_col: usize,
    pub geo_type: GeoType,
    pub has_header: bool,
    pub processed_prefix: Option<String>,
}

struct Overlap {
    area_id: AreaId,
    intersection: MultiPolygon<f64>,
}

pub struct AreaService {
    grid: Vec<Polygon<f64>>,
    cell_index: Vec<AreaId>,
    cell_overlaps: HashMap<usize, Vec<Overlap>>,
    area_name: HashMap<AreaId, String>,
    initialized: bool,

    pub nodes_with_no_country: u64,
    pub nodes_with_single_country: u64,
    pub nodes_with_multiple_countries: u64,
}

impl AreaService {
    pub fn new() -> Self {
        Self {
            grid: build_grid(),
            cell_index: vec![AREA_NONE; GridCell::COUNT],
            cell_overlaps: HashMap::new(),
            area_name: HashMap::new(),
            initialized: false,
            nodes_with_no_country: 0,
            nodes_with_single_country: 0,
            nodes_with_multiple_countries: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn load(&mut self, config: &AreaMappingConfig) -> Result<(), AreaError> {
        if let Some(prefix) = &config.processed_prefix {
            if self.load_processed(prefix)? {
                self.initialized = true;
                return Ok(());
            }
        }

        self.load_source(config)?;
        self.initialized = true;

        if let Some(prefix) = &config.processed_prefix {
            if let Err(err) = self.persist_processed(prefix) {
                tracing::warn!(error = %err, "failed to persist processed area-mapping cache");
            }
        }

        Ok(())
    }

    fn processed_paths(prefix: &str) -> (PathBuf, PathBuf, PathBuf) {
        (
            PathBuf::from(format!("{prefix}area.csv")),
            PathBuf::from(format!("{prefix}index.csv")),
            PathBuf::from(format!("{prefix}id.csv")),
        )
    }

    /// spec §4.3 load step 1. Returns `Ok(false)` (not an error) if the
    /// cache files are simply absent, so the caller falls through to a
    /// fresh load.
    fn load_processed(&mut self, prefix: &str) -> Result<bool, AreaError> {
        let (area_path, index_path, id_path) = Self::processed_paths(prefix);
        if !area_path.exists() || !index_path.exists() || !id_path.exists() {
            return Ok(false);
        }

        let mut id_reader = csv_reader(&id_path)?;
        for row in id_reader.records() {
            let row = match row {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(error = %err, "corrupt row in processed id.csv, skipping");
                    continue;
                }
            };
            if let (Some(id), Some(name)) = (row.get(0), row.get(1)) {
                if let Ok(id) = id.parse::<AreaId>() {
                    self.area_name.insert(id, name.to_string());
                }
            }
        }

        let mut index_reader = csv_reader(&index_path)?;
        for row in index_reader.records() {
            let row = match row {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(error = %err, "corrupt row in processed index.csv, skipping");
                    continue;
                }
            };
            if let (Some(cell), Some(id)) = (row.get(0), row.get(1)) {
                if let (Ok(cell), Ok(id)) = (cell.parse::<usize>(), id.parse::<AreaId>()) {
                    if cell < self.cell_index.len() && id != AREA_NONE {
                        self.cell_index[cell] = id;
                    }
                }
            }
        }

        let mut area_reader = csv_reader(&area_path)?;
        for row in area_reader.records() {
            let row = match row {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(error = %err, "corrupt row in processed area.csv, skipping");
                    continue;
                }
            };
            let (Some(cell), Some(id), Some(wkt)) = (row.get(0), row.get(1), row.get(2)) else {
                continue;
            };
            let (Ok(cell), Ok(id)) = (cell.parse::<usize>(), id.parse::<AreaId>()) else {
                continue;
            };
            match parse_wkt_multipolygon(wkt) {
                Some(geom) => {
                    self.cell_overlaps.entry(cell).or_default().push(Overlap {
                        area_id: id,
                        intersection: geom,
                    });
                }
                None => tracing::warn!(cell, id, "failed to parse cached intersection geometry, skipping"),
            }
        }

        Ok(true)
    }

    /// spec §4.3 load step 2.
    fn load_source(&mut self, config: &AreaMappingConfig) -> Result<(), AreaError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .quote(b'"')
            .escape(Some(b'\\'))
            .has_headers(false)
            .from_path(&config.path)?;

        let mut next_id: AreaId = 1;
        for (row_idx, row) in reader.records().enumerate() {
            if row_idx == 0 && config.has_header {
                continue;
            }
            let row = match row {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable row in area mapping CSV, skipping");
                    continue;
                }
            };
            let max_col = config.id_col.max(config.geo_col);
            if row.len() <= max_col {
                continue;
            }

            let area_code = row.get(config.id_col).unwrap_or_default();
            let geo_field = row.get(config.geo_col).unwrap_or_default();

            if !geo_field_looks_valid(geo_field, config.geo_type) {
                tracing::warn!(row = row_idx, "invalid geometry field, skipping row but advancing id sequence");
                // spec §9 open question: invalid rows still consume an
                // id so valid rows retain "row number post header" as
                // their id. We reproduce that rather than compacting ids.
                next_id = next_id.saturating_add(1);
                continue;
            }

            let Some(geometry) = parse_geometry(geo_field, config.geo_type) else {
                tracing::warn!(row = row_idx, "failed to parse geometry, skipping row");
                next_id = next_id.saturating_add(1);
                continue;
            };

            if next_id == AREA_MULTIPLE {
                return Err(AreaError::TooManyAreas);
            }

            let id = next_id;
            next_id += 1;
            self.area_name.insert(id, area_code.to_string());
            self.add_area(id, &geometry);
        }

        Ok(())
    }

    /// spec §4.3 `add_area`.
    fn add_area(&mut self, id: AreaId, geometry: &MultiPolygon<f64>) {
        for (cell_idx, cell) in self.grid.iter().enumerate() {
            if !cell.intersects(geometry) {
                continue;
            }
            if geometry.contains(cell) {
                self.cell_index[cell_idx] = id;
            } else {
                self.cell_index[cell_idx] = AREA_MULTIPLE;
                let intersection = cell.intersection(geometry);
                self.cell_overlaps
                    .entry(cell_idx)
                    .or_default()
                    .push(Overlap {
                        area_id: id,
                        intersection,
                    });
            }
        }
    }

    fn persist_processed(&self, prefix: &str) -> std::io::Result<()> {
        let (area_path, index_path, id_path) = Self::processed_paths(prefix);

        let mut id_file = std::fs::File::create(id_path)?;
        for (id, name) in &self.area_name {
            writeln!(id_file, "{id};{name}")?;
        }

        let mut index_file = std::fs::File::create(index_path)?;
        for (cell, id) in self.cell_index.iter().enumerate() {
            if *id != AREA_NONE {
                writeln!(index_file, "{cell};{id}")?;
            }
        }

        let mut area_file = std::fs::File::create(area_path)?;
        for (cell, overlaps) in &self.cell_overlaps {
            for overlap in overlaps {
                use wkt::ToWkt;
                writeln!(
                    area_file,
                    "{cell};{};{}",
                    overlap.area_id,
                    overlap.intersection.to_wkt()
                )?;
            }
        }

        Ok(())
    }

    /// spec §4.3 `get_area`.
    pub fn get_area(&mut self, loc: Location) -> Vec<String> {
        if !self.initialized {
            return Vec::new();
        }
        let Some(cell) = GridCell::from_location(loc) else {
            self.nodes_with_no_country += 1;
            return Vec::new();
        };

        let names = match self.cell_index[cell.0] {
            AREA_NONE => Vec::new(),
            AREA_MULTIPLE => {
                let point = geo_types::Point::new(loc.lon, loc.lat);
                self.cell_overlaps
                    .get(&cell.0)
                    .into_iter()
                    .flatten()
                    .filter(|o| o.intersection.contains(&point))
                    .filter_map(|o| self.area_name.get(&o.area_id).cloned())
                    .collect()
            }
            id => self
                .area_name
                .get(&id)
                .cloned()
                .into_iter()
                .collect::<Vec<_>>(),
        };

        match names.len() {
            0 => self.nodes_with_no_country += 1,
            1 => self.nodes_with_single_country += 1,
            _ => self.nodes_with_multiple_countries += 1,
        }
        names
    }
}

impl Default for AreaService {
    fn default() -> Self {
        Self::new()
    }
}

/// spec §3: `Polygon([(lon,lat),(lon+1,lat),(lon+1,lat+1),(lon,lat+1)])`
/// for integer `lon in [-180,179]`, `lat in [-90,89]`.
fn build_grid() -> Vec<Polygon<f64>> {
    let mut grid = Vec::with_capacity(GridCell::COUNT);
    for lat in -90..90 {
        for lon in -180..180 {
            let lat = lat as f64;
            let lon = lon as f64;
            grid.push(Polygon::new(
                geo_types::LineString::from(vec![
                    (lon, lat),
                    (lon + 1.0, lat),
                    (lon + 1.0, lat + 1.0),
                    (lon, lat + 1.0),
                    (lon, lat),
                ]),
                vec![],
            ));
        }
    }
    grid
}

fn geo_field_looks_valid(field: &str, geo_type: GeoType) -> bool {
    let trimmed = field.trim();
    match geo_type {
        GeoType::Wkt => {
            trimmed.to_uppercase().starts_with("MULTIPOLYGON") || trimmed.to_uppercase().starts_with("POLYGON")
        }
        GeoType::GeoJson => trimmed.starts_with('{') && trimmed.ends_with('}'),
    }
}

fn parse_geometry(field: &str, geo_type: GeoType) -> Option<MultiPolygon<f64>> {
    match geo_type {
        GeoType::Wkt => parse_wkt_multipolygon(field),
        GeoType::GeoJson => parse_geojson_multipolygon(field),
    }
}

fn parse_wkt_multipolygon(field: &str) -> Option<MultiPolygon<f64>> {
    use std::str::FromStr;
    let wkt = wkt::Wkt::from_str(field.trim()).ok()?;
    let geometry: Geometry<f64> = wkt.try_into().ok()?;
    geometry_to_multipolygon(geometry)
}

fn parse_geojson_multipolygon(field: &str) -> Option<MultiPolygon<f64>> {
    let geojson: geojson::GeoJson = field.parse().ok()?;
    let geometry: Geometry<f64> = geo_types::Geometry::try_from(geojson).ok()?;
    geometry_to_multipolygon(geometry)
}

fn geometry_to_multipolygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, AreaError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_64800_cells() {
        assert_eq!(build_grid().len(), GridCell::COUNT);
        assert_eq!(GridCell::COUNT, 64_800);
    }

    #[test]
    fn uninitialized_service_returns_empty() {
        let mut service = AreaService::new();
        assert!(service.get_area(Location::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn single_area_cell_returns_exactly_one_name() {
        let mut service = AreaService::new();
        service.initialized = true;
        let cell = GridCell::from_location(Location::new(4.5, 50.5)).unwrap();
        service.cell_index[cell.0] = 1;
        service.area_name.insert(1, "BEL".to_string());
        assert_eq!(service.get_area(Location::new(4.5, 50.5)), vec!["BEL".to_string()]);
        assert_eq!(service.nodes_with_single_country, 1);
    }

    #[test]
    fn multiple_area_cell_filters_by_containment() {
        let mut service = AreaService::new();
        service.initialized = true;
        let cell = GridCell::from_location(Location::new(6.09, 50.72)).unwrap();
        service.cell_index[cell.0] = AREA_MULTIPLE;
        service.area_name.insert(1, "DEU".to_string());
        service.area_name.insert(2, "BEL".to_string());

        // BEL covers the west half of the cell, DEU the east half.
        let bel = Polygon::new(
            geo_types::LineString::from(vec![(6.0, 50.0), (6.09, 50.0), (6.09, 51.0), (6.0, 51.0), (6.0, 50.0)]),
            vec![],
        );
        let deu = Polygon::new(
            geo_types::LineString::from(vec![(6.09, 50.0), (7.0, 50.0), (7.0, 51.0), (6.09, 51.0), (6.09, 50.0)]),
            vec![],
        );
        service.cell_overlaps.insert(
            cell.0,
            vec![
                Overlap { area_id: 2, intersection: MultiPolygon::new(vec![bel]) },
                Overlap { area_id: 1, intersection: MultiPolygon::new(vec![deu]) },
            ],
        );

        let result = service.get_area(Location::new(6.0902180, 50.7220057));
        assert_eq!(result, vec!["BEL".to_string()]);
        assert_eq!(service.nodes_with_single_country, 1);
    }
}
