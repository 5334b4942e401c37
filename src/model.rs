//! Core OSM entity types shared by both passes.
//!
//! These are a thin, owned representation of the entities the PBF codec
//! hands us (see [`crate::pbf_io`]) — we do not carry the codec's borrowed
//! types past a single element visit.

/// A WGS84 location in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
}

impl Location {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Straight-line distance in degrees, used only for interpolation step
    /// sizing (spec §4.2) — not a geodesic distance.
    pub fn planar_distance(self, other: Self) -> f64 {
        let dx = other.lon - self.lon;
        let dy = other.lat - self.lat;
        (dx * dx + dy * dy).sqrt()
    }
}

pub type Tag = (String, String);

#[derive(Debug, Clone)]
pub struct Node {
    pub id: i64,
    pub location: Location,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct Way {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub kind: MemberKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Vec<Tag>,
}

/// Sentinel for "elevation unknown", shared by the raster and elevation
/// service (spec GLOSSARY: NODATA).
pub const NODATA: f64 = -32768.0;

/// `AreaId` 0 means "no area"; `u16::MAX` means "multiple areas overlap
/// this cell" (spec §3).
pub type AreaId = u16;
pub const AREA_NONE: AreaId = 0;
pub const AREA_MULTIPLE: AreaId = u16::MAX;

/// One of the 180x360 unit-degree cells covering the globe (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell(pub usize);

impl GridCell {
    pub const COUNT: usize = 180 * 360;

    /// `((lat+90)*360 + (lon+180))`, floor of lon/lat.
    pub fn from_location(loc: Location) -> Option<Self> {
        let lon_i = loc.lon.floor() as i64;
        let lat_i = loc.lat.floor() as i64;
        if !(-180..180).contains(&lon_i) || !(-90..90).contains(&lat_i) {
            return None;
        }
        let idx = ((lat_i + 90) * 360 + (lon_i + 180)) as usize;
        Some(GridCell(idx))
    }
}
