//! Fallback rules that fill missing coefficients from related classes.
//!
//! Rules only ever fill an absent value. Reference values come from raw
//! values, so applying the chain twice gives the same result as once.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classes::ClassGroup;
use crate::error::{CarbonError, Result};
use crate::resolve::{CoefficientRow, NO_RULE};

pub const TAG_WETLAND_FOREST: &str = "wetland_woody=forest";
pub const TAG_WETLAND_SHRUB: &str = "wetland_to_shrub";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Savanna carbon as a fraction of the forest reference.
    pub savanna_fraction_of_forest: f64,
    pub wetland_equals_forest: bool,
    pub marsh_equals_shrub: bool,
    /// Accepted and reported; never overwrites a present value.
    pub force_wetland_overrides: bool,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            savanna_fraction_of_forest: 0.4,
            wetland_equals_forest: true,
            marsh_equals_shrub: true,
            force_wetland_overrides: false,
        }
    }
}

impl RuleConfig {
    pub fn validate(&self) -> Result<()> {
        let f = self.savanna_fraction_of_forest;
        if !f.is_finite() || f < 0.0 {
            return Err(CarbonError::Config(format!(
                "savanna_fraction_of_forest must be a non-negative number, got {f}"
            )));
        }
        Ok(())
    }

    pub fn savanna_tag(&self) -> String {
        format!("savanna={:.0}%_forest", self.savanna_fraction_of_forest * 100.0)
    }
}

/// Unweighted mean of the present raw values of a class group.
pub fn reference_value(rows: &[CoefficientRow], group: ClassGroup) -> Option<f64> {
    let (sum, n) = rows
        .iter()
        .filter(|r| group.contains(r.land_cover_code))
        .filter_map(|r| r.raw_carbon_value)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn fill(rows: &mut [CoefficientRow], group: ClassGroup, value: f64, tag: &str) -> usize {
    let mut filled = 0;
    for row in rows
        .iter_mut()
        .filter(|r| group.contains(r.land_cover_code) && r.adjusted_carbon_value.is_none())
    {
        row.adjusted_carbon_value = Some(value);
        row.rule_applied = tag.to_string();
        filled += 1;
    }
    filled
}

/// Apply the fallback chain in place.
///
/// Resets every row to `adjusted = raw`, `rule_applied = "none"`, then:
///   1. savanna rows ← forest reference × fraction
///   2. wetland rows ← forest reference (if enabled)
///   3. wetland rows still absent ← shrub reference (if enabled)
pub fn apply_fallback_rules(rows: &mut [CoefficientRow], config: &RuleConfig) {
    for row in rows.iter_mut() {
        row.adjusted_carbon_value = row.raw_carbon_value;
        row.rule_applied = NO_RULE.to_string();
    }

    let forest = reference_value(rows, ClassGroup::Forest);
    let shrub = reference_value(rows, ClassGroup::Shrub);

    if let Some(forest) = forest {
        let n = fill(
            rows,
            ClassGroup::Savanna,
            forest * config.savanna_fraction_of_forest,
            &config.savanna_tag(),
        );
        if n > 0 {
            info!(rows = n, fraction = config.savanna_fraction_of_forest, "applied savanna fallback");
        }
    }

    if config.wetland_equals_forest {
        if let Some(forest) = forest {
            let n = fill(rows, ClassGroup::Wetland, forest, TAG_WETLAND_FOREST);
            if n > 0 {
                info!(rows = n, "applied wetland = forest fallback");
            }
        }
    }

    if config.marsh_equals_shrub {
        if let Some(shrub) = shrub {
            let n = fill(rows, ClassGroup::Wetland, shrub, TAG_WETLAND_SHRUB);
            if n > 0 {
                info!(rows = n, "applied wetland = shrub fallback");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::LookupSource;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn row(code: u16, zone: u32, value: Option<f64>) -> CoefficientRow {
        CoefficientRow {
            land_cover_code: code,
            zone_id: zone,
            pixel_count: 1,
            region: "Africa".into(),
            ecological_zone: "Tropical dry forest".into(),
            frontier: 0,
            raw_code: String::new(),
            label: String::new(),
            classification_code: None,
            raw_carbon_value: value,
            adjusted_carbon_value: value,
            rule_applied: NO_RULE.into(),
            lookup_source: LookupSource::Unmatched,
        }
    }

    #[test]
    fn savanna_takes_fraction_of_forest_mean() {
        let mut rows = vec![row(1, 1, Some(100.0)), row(2, 1, Some(200.0)), row(9, 1, None)];
        apply_fallback_rules(&mut rows, &RuleConfig::default());
        assert_relative_eq!(rows[2].adjusted_carbon_value.unwrap(), 60.0);
        assert_eq!(rows[2].rule_applied, "savanna=40%_forest");
        assert_eq!(rows[0].rule_applied, NO_RULE);
    }

    #[test]
    fn present_values_are_never_overwritten() {
        let mut rows = vec![row(1, 1, Some(100.0)), row(8, 1, Some(7.0)), row(11, 1, Some(3.0))];
        apply_fallback_rules(&mut rows, &RuleConfig::default());
        assert_eq!(rows[1].adjusted_carbon_value, Some(7.0));
        assert_eq!(rows[2].adjusted_carbon_value, Some(3.0));
        assert!(rows.iter().all(|r| r.rule_applied == NO_RULE));
    }

    #[test]
    fn wetland_prefers_forest_then_shrub() {
        let mut rows = vec![row(1, 1, Some(80.0)), row(6, 1, Some(20.0)), row(11, 1, None)];
        apply_fallback_rules(&mut rows, &RuleConfig::default());
        assert_eq!(rows[2].adjusted_carbon_value, Some(80.0));
        assert_eq!(rows[2].rule_applied, TAG_WETLAND_FOREST);

        let cfg = RuleConfig { wetland_equals_forest: false, ..RuleConfig::default() };
        apply_fallback_rules(&mut rows, &cfg);
        assert_eq!(rows[2].adjusted_carbon_value, Some(20.0));
        assert_eq!(rows[2].rule_applied, TAG_WETLAND_SHRUB);
    }

    #[test]
    fn rules_without_reference_data_are_no_ops() {
        let mut rows = vec![row(9, 1, None), row(11, 1, None), row(10, 1, None)];
        apply_fallback_rules(&mut rows, &RuleConfig::default());
        assert!(rows.iter().all(|r| r.adjusted_carbon_value.is_none()));
        assert!(rows.iter().all(|r| r.rule_applied == NO_RULE));
    }

    #[test]
    fn fallback_chain_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut rows: Vec<CoefficientRow> = (0..200)
            .map(|i| {
                let code = rng.gen_range(1..=17u16);
                let value = rng.gen_bool(0.5).then(|| rng.gen_range(0.0..300.0));
                row(code, i, value)
            })
            .collect();
        let cfg = RuleConfig { savanna_fraction_of_forest: 0.25, ..RuleConfig::default() };
        apply_fallback_rules(&mut rows, &cfg);
        let once = rows.clone();
        apply_fallback_rules(&mut rows, &cfg);
        assert_eq!(rows, once);
    }

    #[test]
    fn negative_fraction_is_rejected() {
        let cfg = RuleConfig { savanna_fraction_of_forest: -0.1, ..RuleConfig::default() };
        assert!(cfg.validate().is_err());
        assert!(RuleConfig::default().validate().is_ok());
    }
}
