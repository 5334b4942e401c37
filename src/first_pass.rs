//! The first-pass streaming visitor (spec §4.4): decides which ways and
//! relations are retained, and transitively marks the node ids they
//! reference. Nodes themselves are never visited — the reader is asked
//! for ways/relations only (spec §4.4 "Visits ways and relations only").

use regex::Regex;

use crate::idset::{NoElevationIds, ValidIds};
use crate::model::{MemberKind, Relation, Way};
use crate::pbf_io::{Element, EntityReader};
use crate::tags::{has_no_elevation_tag, has_no_relevant_tags};

#[derive(Debug, Default, Clone, Copy)]
pub struct FirstPassStats {
    pub ways_seen: u64,
    pub ways_kept: u64,
    pub relations_seen: u64,
    pub relations_kept: u64,
}

/// Runs spec §4.4 over the reader, filling `valid_ids`/`no_elevation` in
/// place. Returns basic counts for the final report (spec §7
/// "reduction percentage").
pub fn run(
    reader: &mut EntityReader,
    removal: &Regex,
    valid_ids: &mut ValidIds,
    no_elevation: &mut NoElevationIds,
) -> Result<FirstPassStats, crate::error::PbfError> {
    let mut stats = FirstPassStats::default();

    reader.for_each_way_or_relation(|element| match element {
        Element::Way(way) => {
            stats.ways_seen += 1;
            if visit_way(&way, removal, valid_ids, no_elevation) {
                stats.ways_kept += 1;
            }
        }
        Element::Relation(relation) => {
            stats.relations_seen += 1;
            if visit_relation(&relation, removal, valid_ids) {
                stats.relations_kept += 1;
            }
        }
        Element::Node(_) => {}
    })?;

    Ok(stats)
}

/// spec §4.4 "Per way". Returns whether the way was retained.
fn visit_way(
    way: &Way,
    removal: &Regex,
    valid_ids: &mut ValidIds,
    no_elevation: &mut NoElevationIds,
) -> bool {
    if way.id < 0 {
        return false;
    }

    let is_removable = way.refs.len() < 2 || has_no_relevant_tags(&way.tags, removal);
    if is_removable {
        return false;
    }

    valid_ids.ways_mut().set(way.id);
    for &node_ref in &way.refs {
        valid_ids.nodes_mut().set(node_ref);
    }

    if has_no_elevation_tag(&way.tags) {
        no_elevation.ways_mut().set(way.id);
        for &node_ref in &way.refs {
            no_elevation.nodes_mut().set(node_ref);
        }
    }

    true
}

/// spec §4.4 "Per relation". Ways referenced by a relation are
/// deliberately NOT transitively included (spec: "a deliberate
/// simplification").
fn visit_relation(relation: &Relation, removal: &Regex, valid_ids: &mut ValidIds) -> bool {
    if relation.id < 0 {
        return false;
    }

    if has_no_relevant_tags(&relation.tags, removal) {
        return false;
    }

    valid_ids.relations_mut().set(relation.id);
    for member in &relation.members {
        if member.kind == MemberKind::Node {
            valid_ids.nodes_mut().set(member.id);
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Member, Tag};
    use crate::tags::{compile_removal_regex, DEFAULT_REMOVE_TAG_REGEX};

    fn re() -> Regex {
        compile_removal_regex(DEFAULT_REMOVE_TAG_REGEX).unwrap()
    }

    fn tag(k: &str, v: &str) -> Tag {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn scenario_tag_filter_only_retains_way_and_nodes() {
        let mut valid = ValidIds::new();
        let mut no_ele = NoElevationIds::new();
        let way = Way {
            id: 10,
            refs: vec![101, 102],
            tags: vec![tag("highway", "yes")],
        };
        assert!(visit_way(&way, &re(), &mut valid, &mut no_ele));
        assert!(valid.ways().get(10));
        assert!(valid.nodes().get(101));
        assert!(valid.nodes().get(102));
    }

    #[test]
    fn scenario_invalidating_tag_demotes_way() {
        let mut valid = ValidIds::new();
        let mut no_ele = NoElevationIds::new();
        let way = Way {
            id: 20,
            refs: vec![1, 2],
            tags: vec![tag("building", "yes")],
        };
        assert!(!visit_way(&way, &re(), &mut valid, &mut no_ele));
        assert!(!valid.ways().get(20));
        assert!(!valid.nodes().get(1));
    }

    #[test]
    fn short_way_is_removed_regardless_of_tags() {
        let mut valid = ValidIds::new();
        let mut no_ele = NoElevationIds::new();
        let way = Way {
            id: 30,
            refs: vec![1],
            tags: vec![tag("highway", "primary")],
        };
        assert!(!visit_way(&way, &re(), &mut valid, &mut no_ele));
    }

    #[test]
    fn scenario_no_elevation_propagation_marks_way_and_nodes() {
        let mut valid = ValidIds::new();
        let mut no_ele = NoElevationIds::new();
        let way = Way {
            id: 40,
            refs: vec![1, 2, 3],
            tags: vec![tag("highway", "primary"), tag("tunnel", "yes")],
        };
        assert!(visit_way(&way, &re(), &mut valid, &mut no_ele));
        assert!(no_ele.ways().get(40));
        assert!(no_ele.nodes().get(1));
        assert!(no_ele.nodes().get(2));
        assert!(no_ele.nodes().get(3));
    }

    #[test]
    fn no_elevation_with_value_no_does_not_mark() {
        let mut valid = ValidIds::new();
        let mut no_ele = NoElevationIds::new();
        let way = Way {
            id: 41,
            refs: vec![1, 2],
            tags: vec![tag("highway", "primary"), tag("bridge", "no")],
        };
        assert!(visit_way(&way, &re(), &mut valid, &mut no_ele));
        assert!(!no_ele.ways().get(41));
    }

    #[test]
    fn relation_includes_node_members_but_not_way_members() {
        let mut valid = ValidIds::new();
        let relation = Relation {
            id: 5,
            members: vec![
                Member { kind: MemberKind::Node, id: 1, role: String::new() },
                Member { kind: MemberKind::Way, id: 2, role: String::new() },
            ],
            tags: vec![tag("route", "hiking")],
        };
        assert!(visit_relation(&relation, &re(), &mut valid));
        assert!(valid.relations().get(5));
        assert!(valid.nodes().get(1));
        assert!(!valid.ways().get(2));
    }

    #[test]
    fn relation_with_no_relevant_tags_is_dropped() {
        let mut valid = ValidIds::new();
        let relation = Relation {
            id: 6,
            members: vec![Member { kind: MemberKind::Node, id: 1, role: String::new() }],
            tags: vec![tag("fixme", "yes")],
        };
        assert!(!visit_relation(&relation, &re(), &mut valid));
        assert!(!valid.relations().get(6));
    }
}
