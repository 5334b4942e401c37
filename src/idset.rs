//! Dense and sparse id-set containers (spec §3: `IdSetDense`, `IdSetSmall`).
//!
//! Node/way/relation ids in OSM extracts run up into the billions but are
//! sparse, so a `Vec<bool>` is unworkable. We reach for `roaring`'s 64-bit
//! `RoaringTreemap` the way `meilisearch`'s geo-sort ranking rule reaches
//! for `roaring::RoaringBitmap` to keep a compressed candidate set — same
//! idea, widened to 64-bit ids.

use roaring::RoaringTreemap;

/// A set of non-negative 64-bit ids whose memory scales with the number of
/// runs of set bits rather than the max id, while still supporting O(1)-ish
/// `set`/`get`. Used for node/way/relation retention and for `no_elevation`
/// nodes (spec §3).
#[derive(Debug, Clone, Default)]
pub struct IdSetDense {
    bits: RoaringTreemap,
}

impl IdSetDense {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: i64) {
        debug_assert!(id >= 0, "OSM ids passed to IdSetDense must be non-negative");
        self.bits.insert(id as u64);
    }

    pub fn get(&self, id: i64) -> bool {
        if id < 0 {
            return false;
        }
        self.bits.contains(id as u64)
    }

    pub fn size(&self) -> u64 {
        self.bits.len()
    }
}

/// A compact sparse set for small cardinalities, used for `no_elevation`
/// ways (spec §3: most ways are not bridges/tunnels, so this set stays
/// tiny relative to `valid_ids.ways()`).
#[derive(Debug, Clone, Default)]
pub struct IdSetSmall {
    ids: std::collections::HashSet<i64>,
}

impl IdSetSmall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: i64) {
        self.ids.insert(id);
    }

    pub fn get(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }
}

/// The three id sets populated by the first pass and consulted read-only
/// during rewrite (spec §3 "Lifecycles").
#[derive(Debug, Default)]
pub struct ValidIds {
    nodes: IdSetDense,
    ways: IdSetDense,
    relations: IdSetDense,
}

impl ValidIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &IdSetDense {
        &self.nodes
    }
    pub fn nodes_mut(&mut self) -> &mut IdSetDense {
        &mut self.nodes
    }
    pub fn ways(&self) -> &IdSetDense {
        &self.ways
    }
    pub fn ways_mut(&mut self) -> &mut IdSetDense {
        &mut self.ways
    }
    pub fn relations(&self) -> &IdSetDense {
        &self.relations
    }
    pub fn relations_mut(&mut self) -> &mut IdSetDense {
        &mut self.relations
    }
}

/// Ways/nodes that must not be subdivided with synthetic elevation samples
/// (spec §3, §4.4: bridge/tunnel/cutting/indoor).
#[derive(Debug, Default)]
pub struct NoElevationIds {
    nodes: IdSetDense,
    ways: IdSetSmall,
}

impl NoElevationIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &IdSetDense {
        &self.nodes
    }
    pub fn nodes_mut(&mut self) -> &mut IdSetDense {
        &mut self.nodes
    }
    pub fn ways(&self) -> &IdSetSmall {
        &self.ways
    }
    pub fn ways_mut(&mut self) -> &mut IdSetSmall {
        &mut self.ways
    }
}
