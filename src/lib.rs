//! `osm-transform`: streaming filter/enrich pass over an OSM PBF extract
//! for routing graph builders. See `driver::run` for the pipeline entry
//! point and `config::Cli` for the command-line surface.

pub mod area;
pub mod config;
pub mod download;
pub mod driver;
pub mod elevation;
pub mod error;
pub mod first_pass;
pub mod idset;
pub mod model;
pub mod node_location;
pub mod pbf_io;
pub mod raster;
pub mod rewrite;
pub mod stats;
pub mod tags;
