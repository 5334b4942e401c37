//! Tag classification shared by the first-pass and rewrite handlers
//! (spec §4.4). Pulled out of both handlers so the keyword lists have a
//! single home, the way the teacher centralizes `is_supported_highway`
//! for both `collect_nodes` and `process_way_element` in `graph.rs`.

use regex::Regex;

use crate::model::Tag;

/// Keys that, if present on an otherwise-unvalidated way/relation, force
/// removal (spec §4.4).
pub const INVALIDATING_KEYS: &[&str] = &[
    "building",
    "landuse",
    "boundary",
    "natural",
    "place",
    "waterway",
    "aeroway",
    "aviation",
    "military",
    "power",
    "communication",
    "man_made",
];

/// Keys whose presence with a non-"no" value marks a way as not suitable
/// for elevation-based interpolation (spec §4.4).
pub const NO_ELEVATION_KEYS: &[&str] = &["bridge", "tunnel", "cutting", "indoor"];

/// Default tag-removal regex (spec §6 `--remove_tag`), matched
/// case-insensitively against tag keys.
pub const DEFAULT_REMOVE_TAG_REGEX: &str =
    r"(?i)^((.*:)?source(:.*)?|(.*:)?note(:.*)?|url|created_by|fixme|wikipedia)$";

pub fn compile_removal_regex(pattern: &str) -> Result<Regex, regex::Error> {
    // The default pattern already carries `(?i)`; user-supplied patterns
    // might not, so we add the flag unless it's already present to honor
    // "case-insensitive" from spec §4.4 uniformly.
    if pattern.starts_with("(?i)") {
        Regex::new(pattern)
    } else {
        Regex::new(&format!("(?i){pattern}"))
    }
}

/// One of the fixed validating predicates on `(key, value)` (spec §4.4).
pub fn is_validating(key: &str, value: &str) -> bool {
    match key {
        "highway" => true,
        "route" => true,
        "railway" => value == "platform",
        "public_transport" => value == "platform",
        "man_made" => value == "pier",
        _ => false,
    }
}

pub fn is_invalidating_key(key: &str) -> bool {
    INVALIDATING_KEYS.contains(&key)
}

pub fn is_no_elevation_tag(key: &str, value: &str) -> bool {
    NO_ELEVATION_KEYS.contains(&key) && value != "no"
}

/// Filters `tags` down to the ones whose key does not match `removal`,
/// preserving order (spec §4.4 "filtered view").
pub fn filtered_view<'a>(tags: &'a [Tag], removal: &Regex) -> Vec<&'a Tag> {
    tags.iter().filter(|(k, _)| !removal.is_match(k)).collect()
}

/// spec §4.4 `has_no_relevant_tags`.
pub fn has_no_relevant_tags(tags: &[Tag], removal: &Regex) -> bool {
    let filtered = filtered_view(tags, removal);
    if filtered.is_empty() {
        return true;
    }
    if filtered.iter().any(|(k, v)| is_validating(k, v)) {
        return false;
    }
    filtered.iter().any(|(k, _)| is_invalidating_key(k))
}

/// Whether any (unfiltered — NO_ELEVATION keys are never removal
/// candidates in the default regex, but we don't assume that) tag marks
/// the way as not-for-interpolation (spec §4.4).
pub fn has_no_elevation_tag(tags: &[Tag]) -> bool {
    tags.iter().any(|(k, v)| is_no_elevation_tag(k, v))
}

/// spec §4.5 `copy_tags`: drop tags matching `removal`, drop `country`
/// and `ele` (about to be overwritten), then append computed `ele`/
/// `country` tags.
pub fn copy_tags(
    tags: &[Tag],
    removal: &Regex,
    ele: Option<f64>,
    countries: &[String],
) -> Vec<Tag> {
    let mut out: Vec<Tag> = tags
        .iter()
        .filter(|(k, _)| !removal.is_match(k) && k != "country" && k != "ele")
        .cloned()
        .collect();

    if let Some(ele) = ele {
        if ele > crate::model::NODATA {
            out.push(("ele".to_string(), format_elevation(ele)));
        }
    }
    if !countries.is_empty() {
        out.push(("country".to_string(), countries.join(",")));
    }
    out
}

/// Elevation is serialized the way the platform's default `to_string`
/// would render a double (spec §9 "Numeric formatting"): Rust's `f64`
/// `Display` already produces the shortest round-trippable
/// representation, so we lean on it rather than hand-rolling formatting.
pub fn format_elevation(ele: f64) -> String {
    ele.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re() -> Regex {
        compile_removal_regex(DEFAULT_REMOVE_TAG_REGEX).unwrap()
    }

    #[test]
    fn removal_regex_is_case_insensitive() {
        let re = re();
        assert!(re.is_match("fixme"));
        assert!(re.is_match("FIXME"));
        assert!(re.is_match("FixME"));
        assert!(re.is_match("source:name"));
        assert!(re.is_match("name:source"));
        assert!(!re.is_match("highway"));
    }

    #[test]
    fn scenario_tag_filter_only_way_with_highway_is_relevant() {
        let tags = vec![("highway".to_string(), "yes".to_string())];
        assert!(!has_no_relevant_tags(&tags, &re()));
    }

    #[test]
    fn scenario_tag_pruning_removes_all_three_fixme_variants() {
        let tags = vec![
            ("fixme".to_string(), "name".to_string()),
            ("FIXME".to_string(), "yes".to_string()),
            ("FixME".to_string(), "check".to_string()),
        ];
        let pruned = copy_tags(&tags, &re(), None, &[]);
        assert!(pruned.is_empty());
    }

    #[test]
    fn scenario_invalidating_tag_building_has_no_validating_signal() {
        let tags = vec![("building".to_string(), "yes".to_string())];
        assert!(has_no_relevant_tags(&tags, &re()));
    }

    #[test]
    fn validating_signal_overrides_invalidating_one() {
        // A way tagged building=yes AND highway=footway is kept: the
        // validating predicate is checked before the invalidating keys.
        let tags = vec![
            ("building".to_string(), "yes".to_string()),
            ("highway".to_string(), "footway".to_string()),
        ];
        assert!(!has_no_relevant_tags(&tags, &re()));
    }

    #[test]
    fn empty_filtered_view_is_irrelevant() {
        let tags = vec![("fixme".to_string(), "yes".to_string())];
        assert!(has_no_relevant_tags(&tags, &re()));
    }

    #[test]
    fn no_elevation_tag_requires_non_no_value() {
        assert!(has_no_elevation_tag(&[(
            "tunnel".to_string(),
            "yes".to_string()
        )]));
        assert!(!has_no_elevation_tag(&[(
            "tunnel".to_string(),
            "no".to_string()
        )]));
        assert!(!has_no_elevation_tag(&[(
            "highway".to_string(),
            "primary".to_string()
        )]));
    }

    #[test]
    fn copy_tags_appends_ele_and_country_after_dropping_originals() {
        let tags = vec![
            ("ele".to_string(), "12".to_string()),
            ("country".to_string(), "FRA".to_string()),
            ("highway".to_string(), "track".to_string()),
        ];
        let out = copy_tags(&tags, &re(), Some(123.4), &["BEL".to_string()]);
        assert_eq!(out.iter().filter(|(k, _)| k == "ele").count(), 1);
        assert_eq!(out.iter().filter(|(k, _)| k == "country").count(), 1);
        assert!(out.contains(&("ele".to_string(), "123.4".to_string())));
        assert!(out.contains(&("country".to_string(), "BEL".to_string())));
        assert!(out.contains(&("highway".to_string(), "track".to_string())));
    }

    #[test]
    fn copy_tags_omits_ele_when_nodata() {
        let out = copy_tags(&[], &re(), Some(crate::model::NODATA), &[]);
        assert!(out.is_empty());
    }
}
