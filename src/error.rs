//! Error types, one per module with a failure surface, in the teacher's
//! `thiserror`-per-module style (`graph.rs::GraphBuildError`, `dem.rs::DemLoadError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to open raster {path:?}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },
    #[error("raster {path:?} has no band 1: {source}")]
    Band {
        path: std::path::PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },
    #[error("failed to build reprojection for raster {path:?}: {source}")]
    Reproject {
        path: std::path::PathBuf,
        #[source]
        source: proj::ProjCreateError,
    },
}

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("io error scanning geo_tiff_folders: {0}")]
    Io(#[from] std::io::Error),
    #[error("raster error: {0}")]
    Raster(#[from] RasterError),
}

#[derive(Debug, Error)]
pub enum AreaError {
    #[error("io error reading area mapping: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error reading area mapping: {0}")]
    Csv(#[from] csv::Error),
    #[error("too many areas: area id space (u16) exhausted")]
    TooManyAreas,
}

#[derive(Debug, Error)]
pub enum PbfError {
    #[error("failed to open PBF {path:?}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read element: {0}")]
    Read(String),
    #[error("failed to write element: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid value for --{flag}: {reason}")]
    InvalidValue { flag: &'static str, reason: String },
    #[error("failed to read config file {path:?}: {source}")]
    ConfigFile {
        path: std::path::PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("invalid regex for --remove_tag: {0}")]
    Regex(#[from] regex::Error),
}

/// The driver-boundary error (spec §7: "Errors at the driver boundary...
/// are fatal"). Everything else degrades to NODATA/no-area internally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Elevation(#[from] ElevationError),
    #[error(transparent)]
    Area(#[from] AreaError),
    #[error(transparent)]
    Pbf(#[from] PbfError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download error: {0}")]
    Download(String),
}

impl PipelineError {
    /// Exit code per spec §6: 1 for bad configuration, 3 for anything
    /// encountered while actually processing the extract.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            _ => 3,
        }
    }
}
