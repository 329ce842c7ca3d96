//! Removal of constant and multicollinear feature columns.
//!
//! Columns are visited in construction order. A column survives only if
//! its absolute correlation with every column already kept is at most
//! the threshold, so of any offending pair the later-added one is
//! dropped. Identical input and threshold always give the same result.

use crate::analysis::stats;
use crate::model::{Warning, WarningKind};

pub struct Pruned {
    pub columns: Vec<(String, Vec<f64>)>,
    pub warnings: Vec<Warning>,
}

pub fn prune(columns: Vec<(String, Vec<f64>)>, threshold: f64) -> Pruned {
    let mut kept: Vec<(String, Vec<f64>)> = Vec::with_capacity(columns.len());
    let mut warnings = Vec::new();

    for (name, column) in columns {
        if stats::std_dev(&column).is_none_or(|sd| sd == 0.0) {
            warnings.push(Warning::new(
                WarningKind::DroppedConstantFeature,
                format!("feature '{}' has zero variance", name),
            ));
            continue;
        }

        let conflict = kept.iter().find_map(|(kept_name, kept_col)| {
            stats::pearson(kept_col, &column)
                .filter(|r| r.abs() > threshold)
                .map(|r| (kept_name.clone(), r))
        });

        match conflict {
            Some((kept_name, r)) => warnings.push(Warning::new(
                WarningKind::DroppedCorrelatedFeature,
                format!(
                    "feature '{}' dropped: correlation {:.3} with '{}' exceeds {}",
                    name, r, kept_name, threshold
                ),
            )),
            None => kept.push((name, column)),
        }
    }

    Pruned {
        columns: kept,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, values: &[f64]) -> (String, Vec<f64>) {
        (name.to_string(), values.to_vec())
    }

    #[test]
    fn test_later_column_of_correlated_pair_is_dropped() {
        let cols = vec![
            col("a", &[1.0, 2.0, 3.0, 4.0, 5.0]),
            col("b", &[2.0, 4.1, 6.0, 8.2, 10.0]),
            col("c", &[5.0, 1.0, 4.0, 2.0, 3.0]),
        ];
        let pruned = prune(cols, 0.95);
        let names: Vec<_> = pruned.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(pruned.warnings.len(), 1);
        assert_eq!(pruned.warnings[0].kind, WarningKind::DroppedCorrelatedFeature);
        assert!(pruned.warnings[0].message.contains("'b'"));
    }

    #[test]
    fn test_constant_column_is_dropped_before_correlation() {
        let cols = vec![col("flat", &[3.0, 3.0, 3.0]), col("x", &[1.0, 2.0, 4.0])];
        let pruned = prune(cols, 0.9);
        assert_eq!(pruned.columns.len(), 1);
        assert_eq!(pruned.warnings[0].kind, WarningKind::DroppedConstantFeature);
    }

    #[test]
    fn test_negative_correlation_counts_too() {
        let cols = vec![col("up", &[1.0, 2.0, 3.0]), col("down", &[3.0, 2.0, 1.0])];
        let pruned = prune(cols, 0.95);
        assert_eq!(pruned.columns.len(), 1);
        assert_eq!(pruned.columns[0].0, "up");
    }
}
