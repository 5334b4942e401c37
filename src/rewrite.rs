//! The rewrite-pass streaming visitor (spec §4.5): emits the filtered,
//! enriched output PBF — pruned tags, elevation/area tags on nodes, and
//! synthetic interpolation nodes spliced into way node-ref lists.

use regex::Regex;

use crate::area::AreaService;
use crate::elevation::ElevationService;
use crate::error::PbfError;
use crate::idset::{NoElevationIds, ValidIds};
use crate::model::{Node, Relation, Way, NODATA};
use crate::node_location::NodeLocationIndex;
use crate::pbf_io::EntityWriter;
use crate::tags::{copy_tags, format_elevation};

#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteStats {
    pub nodes_written: u64,
    pub nodes_with_elevation: u64,
    pub nodes_with_elevation_not_found: u64,
    pub ways_written: u64,
    pub relations_written: u64,
    pub synthetic_nodes_inserted: u64,
}

/// Everything the rewrite pass needs that outlives a single element
/// visit and is owned by the driver (spec §9 "lent for the duration of
/// the pass"). No back-pointers: this struct borrows, it does not own.
pub struct RewriteHandler<'a> {
    pub valid_ids: &'a ValidIds,
    pub no_elevation: &'a NoElevationIds,
    pub removal: &'a Regex,
    pub elevation: Option<&'a mut ElevationService>,
    pub area: Option<&'a mut AreaService>,
    pub node_location: &'a mut dyn NodeLocationIndex,
    pub interpolate: bool,
    pub threshold: f64,
    next_synthetic_id: i64,
    pub stats: RewriteStats,
}

impl<'a> RewriteHandler<'a> {
    pub fn new(
        valid_ids: &'a ValidIds,
        no_elevation: &'a NoElevationIds,
        removal: &'a Regex,
        elevation: Option<&'a mut ElevationService>,
        area: Option<&'a mut AreaService>,
        node_location: &'a mut dyn NodeLocationIndex,
        interpolate: bool,
        threshold: f64,
        synthetic_start: i64,
    ) -> Self {
        Self {
            valid_ids,
            no_elevation,
            removal,
            elevation,
            area,
            node_location,
            interpolate,
            threshold,
            next_synthetic_id: synthetic_start,
            stats: RewriteStats::default(),
        }
    }

    /// spec §4.5 "Per node".
    pub fn handle_node(&mut self, node: &Node, node_writer: &mut EntityWriter) -> Result<(), PbfError> {
        if node.id < 0 || !self.valid_ids.nodes().get(node.id) {
            return Ok(());
        }

        let ele = match &mut self.elevation {
            Some(service) if service.is_initialized() => {
                let value = service.elevation(node.location, true);
                if value > NODATA {
                    self.stats.nodes_with_elevation += 1;
                } else {
                    self.stats.nodes_with_elevation_not_found += 1;
                }
                Some(value)
            }
            _ => None,
        };

        let countries = match &mut self.area {
            Some(service) if service.is_initialized() => service.get_area(node.location),
            _ => Vec::new(),
        };

        let tags = copy_tags(&node.tags, self.removal, ele, &countries);

        let mut builder = node_writer.node_builder(node.id, node.location);
        for (k, v) in tags {
            builder = builder.tag(k, v);
        }
        builder.finish()?;
        self.stats.nodes_written += 1;

        if self.interpolate {
            self.node_location.set(node.id, node.location);
        }

        Ok(())
    }

    /// spec §4.5 "Per way". `node_writer` is only consulted when
    /// interpolation is enabled (it receives synthetic nodes); pass
    /// `None` when nodes and ways share a single output file, since in
    /// that case interpolation is always disabled (spec §4.5
    /// "Buffering").
    pub fn handle_way(
        &mut self,
        way: &Way,
        node_writer: Option<&mut EntityWriter>,
        way_writer: &mut EntityWriter,
    ) -> Result<(), PbfError> {
        if way.id < 0 || !self.valid_ids.ways().get(way.id) {
            return Ok(());
        }

        let tags = copy_tags(&way.tags, self.removal, None, &[]);
        let refs = self.rewrite_node_refs(way, node_writer)?;

        let mut builder = way_writer.way_builder(way.id);
        for (k, v) in tags {
            builder = builder.tag(k, v);
        }
        builder = builder.node_refs(refs);
        builder.finish()?;
        self.stats.ways_written += 1;
        Ok(())
    }

    /// spec §4.5 "Per relation": members copied verbatim.
    pub fn handle_relation(
        &mut self,
        relation: &Relation,
        way_writer: &mut EntityWriter,
    ) -> Result<(), PbfError> {
        if relation.id < 0 || !self.valid_ids.relations().get(relation.id) {
            return Ok(());
        }

        let tags = copy_tags(&relation.tags, self.removal, None, &[]);
        let mut builder = way_writer.relation_builder(relation.id);
        for (k, v) in tags {
            builder = builder.tag(k, v);
        }
        for member in &relation.members {
            let kind = member.kind;
            builder = builder.member(kind, member.id, member.role.clone());
        }
        builder.finish()?;
        self.stats.relations_written += 1;
        Ok(())
    }

    /// spec §4.5 node-ref list production, including the interpolation
    /// subroutine. Unchanged refs when interpolation is disabled, the
    /// elevation service is not initialized, or the way is flagged
    /// `no_elevation` (spec §4.4/§4.5, scenario 6).
    fn rewrite_node_refs(
        &mut self,
        way: &Way,
        node_writer: Option<&mut EntityWriter>,
    ) -> Result<Vec<i64>, PbfError> {
        let elevation_ready = matches!(&self.elevation, Some(service) if service.is_initialized());
        if !self.interpolate || !elevation_ready || self.no_elevation.ways().get(way.id) {
            return Ok(way.refs.clone());
        }

        let Some(elevation) = self.elevation.as_deref_mut() else {
            return Ok(way.refs.clone());
        };

        // Interpolation is only ever enabled together with a real node
        // writer (spec §4.5 "Buffering"); the early returns above cover
        // every case where `node_writer` would otherwise be `None` here.
        let Some(node_writer) = node_writer else {
            return Ok(way.refs.clone());
        };

        if way.refs.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(way.refs.len());
        let mut from = way.refs[0];
        out.push(from);

        for &to in &way.refs[1..] {
            let locations = self
                .node_location
                .get(from)
                .zip(self.node_location.get(to));

            if let Some((from_loc, to_loc)) = locations {
                let samples = elevation.interpolate(from_loc, to_loc);
                if samples.len() >= 3 {
                    for i in 1..samples.len() - 1 {
                        let a = samples[i - 1].ele;
                        let b = samples[i + 1].ele;
                        let c = samples[i];
                        if c.ele == NODATA {
                            continue;
                        }
                        if (c.ele - (a + b) / 2.0).abs() >= self.threshold {
                            let synthetic_id = self.next_synthetic_id;
                            self.next_synthetic_id += 1;
                            node_writer
                                .node_builder(synthetic_id, c.location)
                                .tag("ele", format_elevation(c.ele))
                                .finish()?;
                            self.stats.synthetic_nodes_inserted += 1;
                            out.push(synthetic_id);
                        }
                    }
                }
            }

            out.push(to);
            from = to;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_location::FlexMemIndex;
    use crate::tags::{compile_removal_regex, DEFAULT_REMOVE_TAG_REGEX};

    fn re() -> Regex {
        compile_removal_regex(DEFAULT_REMOVE_TAG_REGEX).unwrap()
    }

    #[test]
    fn way_without_elevation_service_copies_refs_unchanged() {
        let valid_ids = {
            let mut v = ValidIds::new();
            v.ways_mut().set(1);
            v
        };
        let no_elevation = NoElevationIds::new();
        let removal = re();
        let mut index = FlexMemIndex::new();

        let mut handler = RewriteHandler::new(
            &valid_ids,
            &no_elevation,
            &removal,
            None,
            None,
            &mut index,
            true,
            0.5,
            1_000_000_000,
        );

        let way = Way {
            id: 1,
            refs: vec![10, 20, 30],
            tags: vec![],
        };
        let refs = handler.rewrite_node_refs(&way, Some(&mut dummy_writer())).unwrap();
        assert_eq!(refs, vec![10, 20, 30]);
    }

    #[test]
    fn no_elevation_way_copies_refs_unchanged_even_with_elevation_ready() {
        let valid_ids = {
            let mut v = ValidIds::new();
            v.ways_mut().set(1);
            v
        };
        let mut no_elevation = NoElevationIds::new();
        no_elevation.ways_mut().set(1);
        let removal = re();
        let mut index = FlexMemIndex::new();
        let mut elevation = ElevationService::new(1024);
        elevation.load(&[]).unwrap();

        let mut handler = RewriteHandler::new(
            &valid_ids,
            &no_elevation,
            &removal,
            Some(&mut elevation),
            None,
            &mut index,
            true,
            0.5,
            1_000_000_000,
        );

        let way = Way {
            id: 1,
            refs: vec![10, 20, 30],
            tags: vec![],
        };
        let refs = handler.rewrite_node_refs(&way, Some(&mut dummy_writer())).unwrap();
        assert_eq!(refs, vec![10, 20, 30]);
        assert_eq!(handler.stats.synthetic_nodes_inserted, 0);
    }

    fn dummy_writer() -> EntityWriter {
        // `rewrite_node_refs` only calls `node_writer.node_builder(...)`
        // when samples.len() >= 3, which neither test below reaches (no
        // tiles are loaded), so a scratch file that's never read back is
        // fine here; the interpolation-heavy paths are covered by the
        // integration tests against real PBF/GeoTIFF fixtures instead.
        let file = tempfile::NamedTempFile::new().unwrap();
        let (_, path) = file.keep().unwrap();
        EntityWriter::create(&path, &crate::pbf_io::PbfHeader::default(), "test").unwrap()
    }
}
