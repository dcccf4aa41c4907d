use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::AggregatedRow;
use crate::classes::LandCoverCode;

/// Expert-supplied replacement coefficient for one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideRow {
    pub land_cover_code: LandCoverCode,
    pub override_value: f64,
}

/// Replace the value of every aggregated code that has an override.
/// Codes without a row in `aggregated` are ignored; replaced rows are no
/// longer `defaulted`. Returns the number of replaced rows.
pub fn apply_overrides(aggregated: &mut [AggregatedRow], overrides: &[OverrideRow]) -> usize {
    let mut replaced = 0;
    for row in aggregated.iter_mut() {
        // Last override for a code wins.
        if let Some(o) = overrides
            .iter()
            .rev()
            .find(|o| o.land_cover_code == row.land_cover_code)
        {
            debug!(code = row.land_cover_code, from = row.carbon_value, to = o.override_value, "override");
            row.carbon_value = o.override_value;
            row.defaulted = false;
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_only_existing_codes() {
        let mut rows = vec![AggregatedRow { land_cover_code: 3, carbon_value: 50.0, defaulted: false }];
        let n = apply_overrides(
            &mut rows,
            &[
                OverrideRow { land_cover_code: 3, override_value: 999.0 },
                OverrideRow { land_cover_code: 9, override_value: 5.0 },
            ],
        );
        assert_eq!(n, 1);
        assert_eq!(rows, vec![AggregatedRow { land_cover_code: 3, carbon_value: 999.0, defaulted: false }]);
    }

    #[test]
    fn override_wins_over_defaulted_rows() {
        let mut rows = vec![
            AggregatedRow { land_cover_code: 1, carbon_value: 10.0, defaulted: false },
            AggregatedRow { land_cover_code: 2, carbon_value: 0.0, defaulted: true },
        ];
        apply_overrides(&mut rows, &[OverrideRow { land_cover_code: 2, override_value: 42.0 }]);
        assert_eq!(rows[0].carbon_value, 10.0);
        assert_eq!(rows[1].carbon_value, 42.0);
        assert!(!rows[1].defaulted);
    }

    #[test]
    fn empty_override_set_changes_nothing() {
        let mut rows = vec![AggregatedRow { land_cover_code: 7, carbon_value: 1.5, defaulted: false }];
        let before = rows.clone();
        assert_eq!(apply_overrides(&mut rows, &[]), 0);
        assert_eq!(rows, before);
    }
}
