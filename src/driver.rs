//! Driver / pipeline (spec §4.6): wires together config, both passes,
//! the elevation/area services and the node-location index, and owns
//! the reader/writer lifetimes the rewrite handler only borrows from
//! (spec §9 "Cyclic/self-referential state").

use std::path::{Path, PathBuf};

use crate::area::{AreaMappingConfig, AreaService};
use crate::config::Config;
use crate::download::download_tiles;
use crate::elevation::ElevationService;
use crate::error::PipelineError;
use crate::first_pass;
use crate::idset::{NoElevationIds, ValidIds};
use crate::node_location::build_index;
use crate::pbf_io::{EntityReader, EntityWriter, PbfHeader};
use crate::rewrite::RewriteHandler;
use crate::stats::Report;
use crate::tags::{compile_removal_regex, DEFAULT_REMOVE_TAG_REGEX};

const GENERATOR: &str = concat!("osm-transform ", env!("CARGO_PKG_VERSION"));

/// spec §4.6 step 2: the `--srtm`/`--gmted` subcommand paths, run and
/// exited from before any of the filter/rewrite machinery is touched.
pub fn run_download(config: &Config) -> Result<(), PipelineError> {
    if config.download_srtm {
        let outcome = download_tiles(Path::new("tiles_srtm.csv"), Path::new("srtmdata"), true)?;
        tracing::info!(
            downloaded = outcome.downloaded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "SRTM download complete"
        );
    }
    if config.download_gmted {
        let outcome = download_tiles(Path::new("tiles_gmted.csv"), Path::new("gmteddata"), false)?;
        tracing::info!(
            downloaded = outcome.downloaded,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "GMTED download complete"
        );
    }
    Ok(())
}

/// spec §4.6 steps 3-10, minus the download subcommand.
pub fn run(config: &Config) -> Result<Report, PipelineError> {
    if config.download_srtm || config.download_gmted {
        run_download(config)?;
        return Ok(Report::default());
    }

    let input_path = config
        .osm_pbf
        .as_ref()
        .ok_or(crate::error::ConfigError::MissingArgument("osm_pbf"))?;
    let output_path = config
        .resolved_output_path()
        .ok_or(crate::error::ConfigError::MissingArgument("output"))?;

    let removal_pattern = config.remove_tag.as_deref().unwrap_or(DEFAULT_REMOVE_TAG_REGEX);
    let removal = compile_removal_regex(removal_pattern).map_err(crate::error::ConfigError::Regex)?;

    let mut valid_ids = ValidIds::new();
    let mut no_elevation = NoElevationIds::new();

    tracing::info!(input = %input_path.display(), "starting first pass");
    let mut first_reader = EntityReader::open_labeled(input_path, "first pass")?;
    let first_pass_stats = first_pass::run(&mut first_reader, &removal, &mut valid_ids, &mut no_elevation)?;
    drop(first_reader);

    let add_elevation = !config.skip_elevation;
    let mut elevation = ElevationService::new(config.cache_limit_bytes);
    if add_elevation {
        tracing::info!("loading elevation rasters");
        elevation.load(&config.geo_tiff_folders)?;
    }

    let mut area = AreaService::new();
    if let Some(path) = &config.area_mapping {
        tracing::info!(path = %path.display(), "loading area mapping");
        area.load(&AreaMappingConfig {
            path: path.clone(),
            id_col: config.area_mapping_id_col,
            geo_col: config.area_mapping_geo_col,
            geo_type: match config.area_mapping_geo_type {
                crate::config::AreaGeoType::Wkt => crate::area::GeoType::Wkt,
                crate::config::AreaGeoType::GeoJson => crate::area::GeoType::GeoJson,
            },
            has_header: config.area_mapping_has_header,
            processed_prefix: config.area_mapping_processed_file_prefix.clone(),
        })?;
    }

    let mut node_location = build_index(&config.index_type);

    tracing::info!("starting rewrite pass");
    let mut reader = EntityReader::open_labeled(input_path, "rewrite pass")?;
    let header = reader.header().clone();

    let rewrite_stats = if config.interpolate {
        run_split_rewrite(
            &mut reader,
            &header,
            &output_path,
            &valid_ids,
            &no_elevation,
            &removal,
            add_elevation.then_some(&mut elevation),
            config.area_mapping.is_some().then_some(&mut area),
            &mut *node_location,
            config.threshold,
            config.synthetic_start,
        )?
    } else {
        run_single_file_rewrite(
            &mut reader,
            &header,
            &output_path,
            &valid_ids,
            &no_elevation,
            &removal,
            add_elevation.then_some(&mut elevation),
            config.area_mapping.is_some().then_some(&mut area),
            &mut *node_location,
            config.threshold,
            config.synthetic_start,
        )?
    };

    let report = Report::collect(
        first_pass_stats,
        rewrite_stats,
        add_elevation.then_some(&elevation),
        config.area_mapping.is_some().then_some(&area),
        valid_ids.nodes().size(),
    );
    report.log_summary();
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn run_single_file_rewrite(
    reader: &mut EntityReader,
    header: &PbfHeader,
    output_path: &Path,
    valid_ids: &ValidIds,
    no_elevation: &NoElevationIds,
    removal: &regex::Regex,
    elevation: Option<&mut ElevationService>,
    area: Option<&mut AreaService>,
    node_location: &mut dyn crate::node_location::NodeLocationIndex,
    threshold: f64,
    synthetic_start: i64,
) -> Result<crate::rewrite::RewriteStats, PipelineError> {
    let mut writer = EntityWriter::create(output_path, header, GENERATOR)?;
    let mut handler = RewriteHandler::new(
        valid_ids,
        no_elevation,
        removal,
        elevation,
        area,
        node_location,
        false,
        threshold,
        synthetic_start,
    );

    let mut write_err = None;
    reader.for_each(|element| {
        if write_err.is_some() {
            return;
        }
        // A single file serves as both node and way/relation sink here;
        // `handle_way`'s `node_writer` is `None` because interpolation
        // (the only consumer of that parameter) is disabled in this path.
        let result = match element {
            crate::pbf_io::Element::Node(node) => handler.handle_node(&node, &mut writer),
            crate::pbf_io::Element::Way(way) => handler.handle_way(&way, None, &mut writer),
            crate::pbf_io::Element::Relation(relation) => handler.handle_relation(&relation, &mut writer),
        };
        if let Err(err) = result {
            write_err = Some(err);
        }
    })?;

    if let Some(err) = write_err {
        return Err(err.into());
    }

    writer.close()?;
    Ok(handler.stats)
}

#[allow(clippy::too_many_arguments)]
fn run_split_rewrite(
    reader: &mut EntityReader,
    header: &PbfHeader,
    output_path: &Path,
    valid_ids: &ValidIds,
    no_elevation: &NoElevationIds,
    removal: &regex::Regex,
    elevation: Option<&mut ElevationService>,
    area: Option<&mut AreaService>,
    node_location: &mut dyn crate::node_location::NodeLocationIndex,
    threshold: f64,
    synthetic_start: i64,
) -> Result<crate::rewrite::RewriteStats, PipelineError> {
    let nodes_path = sibling_path(output_path, "n.pbf");
    let ways_path = sibling_path(output_path, "wr.pbf");

    let mut node_writer = EntityWriter::create(&nodes_path, header, GENERATOR)?;
    let mut way_writer = EntityWriter::create(&ways_path, header, GENERATOR)?;

    let mut handler = RewriteHandler::new(
        valid_ids,
        no_elevation,
        removal,
        elevation,
        area,
        node_location,
        true,
        threshold,
        synthetic_start,
    );

    let mut write_err = None;
    reader.for_each(|element| {
        if write_err.is_some() {
            return;
        }
        let result = match element {
            crate::pbf_io::Element::Node(node) => handler.handle_node(&node, &mut node_writer),
            crate::pbf_io::Element::Way(way) => handler.handle_way(&way, Some(&mut node_writer), &mut way_writer),
            crate::pbf_io::Element::Relation(relation) => handler.handle_relation(&relation, &mut way_writer),
        };
        if let Err(err) = result {
            write_err = Some(err);
        }
    })?;

    if let Some(err) = write_err {
        return Err(err.into());
    }

    node_writer.close()?;
    way_writer.close()?;

    concatenate_and_cleanup(&nodes_path, &ways_path, output_path)?;
    Ok(handler.stats)
}

fn sibling_path(output_path: &Path, suffix: &str) -> PathBuf {
    let mut name = output_path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    output_path.with_file_name(name)
}

/// spec §4.6 step 10: "sequentially copy the two temp files into the
/// final output and delete them."
fn concatenate_and_cleanup(nodes_path: &Path, ways_path: &Path, output_path: &Path) -> Result<(), PipelineError> {
    let mut out = std::fs::File::create(output_path)?;
    let mut nodes_in = std::fs::File::open(nodes_path)?;
    std::io::copy(&mut nodes_in, &mut out)?;
    let mut ways_in = std::fs::File::open(ways_path)?;
    std::io::copy(&mut ways_in, &mut out)?;
    drop(nodes_in);
    drop(ways_in);
    std::fs::remove_file(nodes_path)?;
    std::fs::remove_file(ways_path)?;
    Ok(())
}
