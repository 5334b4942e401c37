//! CLI flags and `--config_file` INI merging (spec §6, SPEC_FULL §4.0b).
//!
//! `Cli` is the `clap::Parser` struct; `Config` is the resolved,
//! validated settings the driver actually consumes. Resolution order is
//! "config file first, then CLI flags override it", matching spec §6's
//! "same options as above" note on `--config_file`.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::ConfigError;

const DEFAULT_CACHE_LIMIT_BYTES: u64 = 1_073_741_824;
const DEFAULT_THRESHOLD: f64 = 0.5;
const DEFAULT_SYNTHETIC_START: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaGeoType {
    Wkt,
    GeoJson,
}

impl std::str::FromStr for AreaGeoType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wkt" => Ok(AreaGeoType::Wkt),
            "geojson" => Ok(AreaGeoType::GeoJson),
            other => Err(ConfigError::InvalidValue {
                flag: "area_mapping_geo_type",
                reason: format!("expected wkt or geojson, got {other:?}"),
            }),
        }
    }
}

/// spec §6 CLI flags.
#[derive(Debug, Parser)]
#[command(
    name = "osm-transform",
    author,
    version,
    about = "Filter, prune and enrich an OSM PBF extract for routing graph builders"
)]
pub struct Cli {
    /// Input PBF. Required unless --srtm/--gmted is given.
    #[arg(long = "osm_pbf", short = 'p')]
    pub osm_pbf: Option<PathBuf>,

    /// Output PBF path. Defaults to the input path with an `out-` file
    /// name prefix alongside it when omitted (spec §6 does not name an
    /// explicit output flag; see DESIGN.md).
    #[arg(long = "output", short = 'o')]
    pub output: Option<PathBuf>,

    /// Disable elevation enrichment.
    #[arg(long = "skip_elevation", short = 'e')]
    pub skip_elevation: bool,

    /// Download bundled SRTM tiles and exit.
    #[arg(long = "srtm")]
    pub srtm: bool,

    /// Download bundled GMTED tiles and exit.
    #[arg(long = "gmted")]
    pub gmted: bool,

    /// Enable edge subdivision with synthetic elevation samples.
    #[arg(long = "interpolate", short = 'i')]
    pub interpolate: bool,

    /// Override the default tag-removal regex.
    #[arg(long = "remove_tag", short = 'T')]
    pub remove_tag: Option<String>,

    /// Raster directories to index.
    #[arg(long = "geo_tiff_folders", short = 'F', num_args = 0..)]
    pub geo_tiff_folders: Vec<PathBuf>,

    /// Raster cache byte budget.
    #[arg(long = "cache_limit", short = 'S')]
    pub cache_limit: Option<u64>,

    /// Interpolation elevation threshold in metres.
    #[arg(long = "threshold", short = 't')]
    pub threshold: Option<f64>,

    /// CSV of polygon -> area id.
    #[arg(long = "area_mapping", short = 'a')]
    pub area_mapping: Option<PathBuf>,

    #[arg(long = "area_mapping_id_col", default_value_t = 0)]
    pub area_mapping_id_col: usize,

    #[arg(long = "area_mapping_geo_col", default_value_t = 1)]
    pub area_mapping_geo_col: usize,

    #[arg(long = "area_mapping_geo_type", default_value = "wkt")]
    pub area_mapping_geo_type: String,

    #[arg(long = "area_mapping_has_header")]
    pub area_mapping_has_header: bool,

    #[arg(long = "area_mapping_processed_file_prefix")]
    pub area_mapping_processed_file_prefix: Option<String>,

    /// INI config file; same options as above, overridden by CLI flags.
    #[arg(long = "config_file", short = 'f')]
    pub config_file: Option<PathBuf>,

    /// Node-location index backend.
    #[arg(long = "index_type", default_value = "flex_mem")]
    pub index_type: String,

    /// Verbose diagnostics.
    #[arg(long = "debug_mode", short = 'd')]
    pub debug_mode: bool,
}

/// The driver's resolved configuration: `Cli` with the config-file
/// overlay applied and every Option<...> given its spec default.
#[derive(Debug, Clone)]
pub struct Config {
    pub osm_pbf: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub skip_elevation: bool,
    pub download_srtm: bool,
    pub download_gmted: bool,
    pub interpolate: bool,
    pub remove_tag: Option<String>,
    pub geo_tiff_folders: Vec<PathBuf>,
    pub cache_limit_bytes: u64,
    pub threshold: f64,
    pub area_mapping: Option<PathBuf>,
    pub area_mapping_id_col: usize,
    pub area_mapping_geo_col: usize,
    pub area_mapping_geo_type: AreaGeoType,
    pub area_mapping_has_header: bool,
    pub area_mapping_processed_file_prefix: Option<String>,
    pub index_type: String,
    pub debug_mode: bool,
    pub synthetic_start: i64,
}

impl Config {
    /// spec §6 names no explicit `--output` flag; we default it next to
    /// the input with an `out-` prefix rather than require one, and
    /// honor an explicit `--output` override when given.
    pub fn resolved_output_path(&self) -> Option<PathBuf> {
        if let Some(output) = &self.output {
            return Some(output.clone());
        }
        let input = self.osm_pbf.as_ref()?;
        let parent = input.parent().unwrap_or_else(|| Path::new("."));
        let name = input.file_name()?.to_string_lossy();
        Some(parent.join(format!("out-{name}")))
    }

    pub fn default_geo_tiff_folders() -> Vec<PathBuf> {
        vec!["tiffs", "srtmdata", "gmteddata"].into_iter().map(PathBuf::from).collect()
    }

    /// Merges an optional `--config_file` INI overlay underneath the CLI
    /// flags (CLI wins), then fills in spec defaults (spec §6).
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let overlay = match &cli.config_file {
            Some(path) => Some(IniOverlay::load(path)?),
            None => None,
        };

        let osm_pbf = cli.osm_pbf.or_else(|| overlay.as_ref().and_then(|o| o.path("osm_pbf")));
        let remove_tag = cli.remove_tag.or_else(|| overlay.as_ref().and_then(|o| o.string("remove_tag")));

        let geo_tiff_folders = if !cli.geo_tiff_folders.is_empty() {
            cli.geo_tiff_folders
        } else if let Some(folders) = overlay.as_ref().and_then(|o| o.path_list("geo_tiff_folders")) {
            folders
        } else {
            Self::default_geo_tiff_folders()
        };

        let cache_limit_bytes = cli
            .cache_limit
            .or_else(|| overlay.as_ref().and_then(|o| o.u64("cache_limit")))
            .unwrap_or(DEFAULT_CACHE_LIMIT_BYTES);

        let threshold = cli
            .threshold
            .or_else(|| overlay.as_ref().and_then(|o| o.f64("threshold")))
            .unwrap_or(DEFAULT_THRESHOLD);

        let area_mapping = cli.area_mapping.or_else(|| overlay.as_ref().and_then(|o| o.path("area_mapping")));

        let area_mapping_geo_type: AreaGeoType = cli.area_mapping_geo_type.parse()?;

        if !cli.srtm && !cli.gmted && osm_pbf.is_none() {
            return Err(ConfigError::MissingArgument("osm_pbf"));
        }

        Ok(Self {
            osm_pbf,
            output: cli.output,
            skip_elevation: cli.skip_elevation,
            download_srtm: cli.srtm,
            download_gmted: cli.gmted,
            interpolate: cli.interpolate,
            remove_tag,
            geo_tiff_folders,
            cache_limit_bytes,
            threshold,
            area_mapping,
            area_mapping_id_col: cli.area_mapping_id_col,
            area_mapping_geo_col: cli.area_mapping_geo_col,
            area_mapping_geo_type,
            area_mapping_has_header: cli.area_mapping_has_header,
            area_mapping_processed_file_prefix: cli.area_mapping_processed_file_prefix,
            index_type: cli.index_type,
            debug_mode: cli.debug_mode,
            synthetic_start: DEFAULT_SYNTHETIC_START,
        })
    }
}

/// Thin wrapper over `ini::Ini` exposing the few accessors `resolve`
/// needs, all read from the file's default (unnamed) section.
struct IniOverlay(ini::Ini);

impl IniOverlay {
    fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let ini = ini::Ini::load_from_file(path).map_err(|source| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self(ini))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.general_section().get(key)
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn path_list(&self, key: &str) -> Option<Vec<PathBuf>> {
        self.get(key).map(|v| v.split(',').map(|s| PathBuf::from(s.trim())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            osm_pbf: Some(PathBuf::from("in.pbf")),
            output: Some(PathBuf::from("out.pbf")),
            skip_elevation: false,
            srtm: false,
            gmted: false,
            interpolate: false,
            remove_tag: None,
            geo_tiff_folders: Vec::new(),
            cache_limit: None,
            threshold: None,
            area_mapping: None,
            area_mapping_id_col: 0,
            area_mapping_geo_col: 1,
            area_mapping_geo_type: "wkt".to_string(),
            area_mapping_has_header: false,
            area_mapping_processed_file_prefix: None,
            config_file: None,
            index_type: "flex_mem".to_string(),
            debug_mode: false,
        }
    }

    #[test]
    fn resolve_fills_spec_defaults() {
        let config = Config::resolve(base_cli()).unwrap();
        assert_eq!(config.cache_limit_bytes, DEFAULT_CACHE_LIMIT_BYTES);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.synthetic_start, DEFAULT_SYNTHETIC_START);
        assert_eq!(config.geo_tiff_folders, Config::default_geo_tiff_folders());
    }

    #[test]
    fn missing_osm_pbf_without_download_flags_is_an_error() {
        let mut cli = base_cli();
        cli.osm_pbf = None;
        assert!(Config::resolve(cli).is_err());
    }

    #[test]
    fn missing_osm_pbf_is_fine_when_downloading() {
        let mut cli = base_cli();
        cli.osm_pbf = None;
        cli.srtm = true;
        assert!(Config::resolve(cli).is_ok());
    }

    #[test]
    fn invalid_geo_type_is_rejected() {
        let mut cli = base_cli();
        cli.area_mapping_geo_type = "shapefile".to_string();
        assert!(Config::resolve(cli).is_err());
    }
}
