//! Reference tables: the land-cover crosswalk and the carbon coefficient
//! lookup. Built once per run and shared read-only by every stage.
//!
//! Every string key is normalized at construction so joins never miss on
//! whitespace or case.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classes::LandCoverCode;

// ── Key normalization ─────────────────────────────────────────────────────────

/// Trim, collapse internal whitespace runs to one space, ASCII-lowercase.
pub fn normalize_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.make_ascii_lowercase();
    out
}

/// Parse a frontier flag from `0`, `1`, `0.0`, `1.0`, `true` or `false`.
pub fn parse_frontier(s: &str) -> Option<u8> {
    match normalize_key(s).as_str() {
        "0" | "0.0" | "false" => Some(0),
        "1" | "1.0" | "true" => Some(1),
        _ => None,
    }
}

/// Normalized 4-part key into the coefficient lookup. Build it with `new`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub classification: String,
    pub region: String,
    pub ecological_zone: String,
    pub frontier: u8,
}

impl LookupKey {
    pub fn new(classification: &str, region: &str, ecological_zone: &str, frontier: u8) -> Self {
        Self {
            classification: normalize_key(classification),
            region: normalize_key(region),
            ecological_zone: normalize_key(ecological_zone),
            frontier: frontier.min(1),
        }
    }
}

// ── Crosswalk ─────────────────────────────────────────────────────────────────

/// One crosswalk row: land-cover code → coarser classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkEntry {
    pub land_cover_code: LandCoverCode,
    pub label: String,
    pub classification: String,
}

#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    entries: HashMap<LandCoverCode, CrosswalkEntry>,
}

impl Crosswalk {
    /// Later rows for the same code replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = CrosswalkEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| {
                let entry = CrosswalkEntry {
                    land_cover_code: e.land_cover_code,
                    label: e.label.trim().to_string(),
                    classification: e.classification.trim().to_string(),
                };
                (entry.land_cover_code, entry)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, code: LandCoverCode) -> Option<&CrosswalkEntry> {
        self.entries.get(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Coefficient lookup ────────────────────────────────────────────────────────

/// One pre-expanded coefficient row.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupEntry {
    pub key: LookupKey,
    /// Carbon density (Mg C / ha).
    pub carbon_value: f64,
    /// Secondary identifier used only by the degraded join.
    pub land_cover_code: Option<LandCoverCode>,
}

/// Coefficient table indexed for the three join flavours.
#[derive(Debug, Clone, Default)]
pub struct CoefficientLookup {
    by_key: HashMap<LookupKey, f64>,
    by_code: HashMap<LandCoverCode, f64>,
    /// Normalized classification → value, over rows of the global region.
    global: HashMap<String, f64>,
    len: usize,
}

impl CoefficientLookup {
    /// Index `entries`. Rows whose normalized region equals `global_region`
    /// also feed the region-independent index. For duplicate keys the first
    /// row wins in every index.
    pub fn new(entries: impl IntoIterator<Item = LookupEntry>, global_region: &str) -> Self {
        let global_region = normalize_key(global_region);
        let mut lookup = CoefficientLookup::default();
        let mut duplicates = 0usize;
        for entry in entries {
            lookup.len += 1;
            if let Some(code) = entry.land_cover_code {
                lookup.by_code.entry(code).or_insert(entry.carbon_value);
            }
            if entry.key.region == global_region {
                lookup
                    .global
                    .entry(entry.key.classification.clone())
                    .or_insert(entry.carbon_value);
            }
            if lookup.by_key.contains_key(&entry.key) {
                duplicates += 1;
            } else {
                lookup.by_key.insert(entry.key, entry.carbon_value);
            }
        }
        if duplicates > 0 {
            debug!(duplicates, "coefficient lookup has duplicate keys; first row kept");
        }
        lookup
    }

    /// Exact 4-key match.
    pub fn get(&self, key: &LookupKey) -> Option<f64> {
        self.by_key.get(key).copied()
    }

    /// Degraded match on land-cover code alone.
    pub fn get_by_code(&self, code: LandCoverCode) -> Option<f64> {
        self.by_code.get(&code).copied()
    }

    /// Region-independent value for a classification.
    pub fn get_global(&self, classification: &str) -> Option<f64> {
        self.global.get(&normalize_key(classification)).copied()
    }

    pub fn has_code_column(&self) -> bool {
        !self.by_code.is_empty()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The immutable reference data a run needs.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    pub crosswalk: Crosswalk,
    pub coefficients: CoefficientLookup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_collapses_and_lowercases() {
        assert_eq!(normalize_key("  Tropical   rainforest\t"), "tropical rainforest");
        assert_eq!(normalize_key("AFRICA"), "africa");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn frontier_accepts_numeric_and_boolean_spellings() {
        assert_eq!(parse_frontier("0"), Some(0));
        assert_eq!(parse_frontier(" 1.0 "), Some(1));
        assert_eq!(parse_frontier("TRUE"), Some(1));
        assert_eq!(parse_frontier("false"), Some(0));
        assert_eq!(parse_frontier("Either"), None);
    }

    #[test]
    fn lookup_key_matches_across_case_and_spacing() {
        let lookup = CoefficientLookup::new(
            vec![LookupEntry {
                key: LookupKey::new("1: Tree Cover", "Africa", "Tropical rainforest", 0),
                carbon_value: 120.0,
                land_cover_code: None,
            }],
            "Global",
        );
        let probe = LookupKey::new(" 1: tree  cover", "AFRICA ", "tropical rainforest", 0);
        assert_eq!(lookup.get(&probe), Some(120.0));
        assert_eq!(lookup.get(&LookupKey::new("1: Tree Cover", "Africa", "Tropical rainforest", 1)), None);
    }

    #[test]
    fn first_duplicate_wins() {
        let key = LookupKey::new("c", "r", "e", 0);
        let lookup = CoefficientLookup::new(
            vec![
                LookupEntry { key: key.clone(), carbon_value: 1.0, land_cover_code: Some(3) },
                LookupEntry { key: key.clone(), carbon_value: 2.0, land_cover_code: Some(3) },
            ],
            "Global",
        );
        assert_eq!(lookup.get(&key), Some(1.0));
        assert_eq!(lookup.get_by_code(3), Some(1.0));
        assert_eq!(lookup.len(), 2);
    }

    #[test]
    fn global_index_only_holds_global_region_rows() {
        let lookup = CoefficientLookup::new(
            vec![
                LookupEntry {
                    key: LookupKey::new("19: Bare areas", "Global", "Global", 0),
                    carbon_value: 2.0,
                    land_cover_code: None,
                },
                LookupEntry {
                    key: LookupKey::new("1: Tree Cover", "Africa", "Tropical rainforest", 0),
                    carbon_value: 120.0,
                    land_cover_code: None,
                },
            ],
            "global",
        );
        assert_eq!(lookup.get_global("19: BARE AREAS"), Some(2.0));
        assert_eq!(lookup.get_global("1: Tree Cover"), None);
        assert!(!lookup.has_code_column());
    }

    #[test]
    fn crosswalk_trims_labels() {
        let cw = Crosswalk::new(vec![CrosswalkEntry {
            land_cover_code: 1,
            label: " Evergreen Needleleaf Forests ".into(),
            classification: " 4: Tree Cover, needle-leaved, evergreen ".into(),
        }]);
        let e = cw.get(1).unwrap();
        assert_eq!(e.label, "Evergreen Needleleaf Forests");
        assert_eq!(e.classification, "4: Tree Cover, needle-leaved, evergreen");
        assert!(cw.get(2).is_none());
    }
}
