//! End-of-pass reporting (spec §7 "User-visible outputs"): accumulates
//! the counters scattered across the first pass, rewrite pass, elevation
//! service and area service and renders the final summary the teacher's
//! `build_graph` bin logs via `tracing::info!`, generalized to the
//! fuller set of counters this pipeline produces.

use crate::area::AreaService;
use crate::elevation::ElevationService;
use crate::first_pass::FirstPassStats;
use crate::rewrite::RewriteStats;

#[derive(Debug, Default)]
pub struct Report {
    pub first_pass: FirstPassStats,
    pub rewrite: RewriteStats,
    pub found_custom: u64,
    pub found_srtm: u64,
    pub found_gmted: u64,
    pub nodes_with_no_country: u64,
    pub nodes_with_single_country: u64,
    pub nodes_with_multiple_countries: u64,
    pub input_node_count: u64,
}

impl Report {
    pub fn collect(
        first_pass: FirstPassStats,
        rewrite: RewriteStats,
        elevation: Option<&ElevationService>,
        area: Option<&AreaService>,
        input_node_count: u64,
    ) -> Self {
        let (found_custom, found_srtm, found_gmted) = elevation
            .map(|e| (e.counters.found_custom, e.counters.found_srtm, e.counters.found_gmted))
            .unwrap_or_default();

        let (no_country, single_country, multi_country) = area
            .map(|a| (a.nodes_with_no_country, a.nodes_with_single_country, a.nodes_with_multiple_countries))
            .unwrap_or_default();

        Self {
            first_pass,
            rewrite,
            found_custom,
            found_srtm,
            found_gmted,
            nodes_with_no_country: no_country,
            nodes_with_single_country: single_country,
            nodes_with_multiple_countries: multi_country,
            input_node_count,
        }
    }

    /// spec §8 invariant: `found_custom + found_srtm + found_gmted ==
    /// nodes_with_elevation`. Exposed so the driver and tests can assert
    /// it holds rather than silently trusting the arithmetic.
    pub fn elevation_counters_consistent(&self) -> bool {
        self.found_custom + self.found_srtm + self.found_gmted == self.rewrite.nodes_with_elevation
    }

    /// spec §7: "final reduction" — fraction of input nodes dropped.
    pub fn node_reduction_percent(&self) -> f64 {
        if self.input_node_count == 0 {
            return 0.0;
        }
        let kept = self.rewrite.nodes_written.saturating_sub(self.rewrite.synthetic_nodes_inserted);
        100.0 * (1.0 - kept as f64 / self.input_node_count as f64)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            ways_seen = self.first_pass.ways_seen,
            ways_kept = self.first_pass.ways_kept,
            relations_seen = self.first_pass.relations_seen,
            relations_kept = self.first_pass.relations_kept,
            "first pass complete"
        );
        tracing::info!(
            nodes_written = self.rewrite.nodes_written,
            ways_written = self.rewrite.ways_written,
            relations_written = self.rewrite.relations_written,
            synthetic_nodes = self.rewrite.synthetic_nodes_inserted,
            reduction_pct = format!("{:.2}", self.node_reduction_percent()),
            "rewrite pass complete"
        );
        tracing::info!(
            nodes_with_elevation = self.rewrite.nodes_with_elevation,
            nodes_without_elevation = self.rewrite.nodes_with_elevation_not_found,
            found_custom = self.found_custom,
            found_srtm = self.found_srtm,
            found_gmted = self.found_gmted,
            "elevation summary"
        );
        tracing::info!(
            no_country = self.nodes_with_no_country,
            single_country = self.nodes_with_single_country,
            multiple_countries = self.nodes_with_multiple_countries,
            "area summary"
        );
        if self.first_pass.ways_seen > 0 && self.first_pass.ways_kept == self.first_pass.ways_seen {
            tracing::warn!(
                "all ways retained - input may already be a pre-filtered extract, not a raw planet/region dump"
            );
        }
    }
}
