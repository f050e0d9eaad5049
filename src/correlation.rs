//! Pearson correlation of risk factors against the outcome

use crate::config::Feature;
use crate::error::AnalysisError;
use crate::scaler::FeatureMatrix;
use ndarray::ArrayView1;
use std::cmp::Ordering;

const MIN_VARIANCE: f64 = 1e-12;

/// Pearson coefficient of two equally long series, or `None` when either is constant.
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let dx = &x - x.mean()?;
    let dy = &y - y.mean()?;

    let sxx = dx.dot(&dx);
    let syy = dy.dot(&dy);
    if sxx / (x.len() as f64) < MIN_VARIANCE || syy / (y.len() as f64) < MIN_VARIANCE {
        return None;
    }

    // Rounding can push |r| a hair past 1
    Some((dx.dot(&dy) / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Correlation between two columns of a raw feature matrix.
///
/// Fails with `InsufficientVariance` naming the constant column.
pub fn correlate(matrix: &FeatureMatrix, a: Feature, b: Feature) -> Result<f64, AnalysisError> {
    let (Some(x), Some(y)) = (matrix.column_of(a), matrix.column_of(b)) else {
        return Err(AnalysisError::InsufficientVariance {
            column: format!("{a} / {b} (not in matrix)"),
        });
    };

    pearson(x, y).ok_or_else(|| {
        let constant = if is_constant(x) { a } else { b };
        AnalysisError::InsufficientVariance {
            column: constant.label().to_string(),
        }
    })
}

fn is_constant(values: ArrayView1<f64>) -> bool {
    values.std(0.0).powi(2) < MIN_VARIANCE
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationEntry {
    pub feature: Feature,
    /// `None` when the feature is constant
    pub coefficient: Option<f64>,
}

/// Correlations against the outcome, sorted by coefficient descending.
/// Undefined coefficients come last.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationRanking {
    pub outcome: Feature,
    pub entries: Vec<CorrelationEntry>,
}

impl CorrelationRanking {
    /// Entries whose coefficient is below `threshold` (strongly protective when negative).
    pub fn protective_factors(&self, threshold: f64) -> Vec<&CorrelationEntry> {
        self.entries
            .iter()
            .filter(|e| e.coefficient.is_some_and(|c| c < threshold))
            .collect()
    }

    pub fn undefined(&self) -> impl Iterator<Item = &CorrelationEntry> {
        self.entries.iter().filter(|e| e.coefficient.is_none())
    }

    pub fn coefficient(&self, feature: Feature) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.feature == feature)
            .and_then(|e| e.coefficient)
    }
}

/// Correlate every feature in `features` (except the outcome itself) against
/// `Feature::LatestOutcome`.
///
/// A constant outcome column makes every coefficient undefined and fails with
/// `InsufficientVariance`; a constant feature only leaves its own entry undefined.
pub fn rank_against_outcome(
    matrix: &FeatureMatrix,
    features: &[Feature],
) -> Result<CorrelationRanking, AnalysisError> {
    let outcome = Feature::LatestOutcome;
    let y = matrix
        .column_of(outcome)
        .ok_or_else(|| AnalysisError::InsufficientVariance {
            column: format!("{outcome} (not in matrix)"),
        })?;
    if is_constant(y) {
        return Err(AnalysisError::InsufficientVariance {
            column: outcome.label().to_string(),
        });
    }

    let mut entries: Vec<CorrelationEntry> = features
        .iter()
        .filter(|&&f| f != outcome)
        .map(|&feature| CorrelationEntry {
            feature,
            coefficient: matrix.column_of(feature).and_then(|x| pearson(x, y)),
        })
        .collect();

    entries.sort_by(|a, b| match (a.coefficient, b.coefficient) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    Ok(CorrelationRanking { outcome, entries })
}

/// Symmetric pairwise correlation matrix, used for the heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub features: Vec<Feature>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Feature, b: Feature) -> Option<f64> {
        let i = self.features.iter().position(|&f| f == a)?;
        let j = self.features.iter().position(|&f| f == b)?;
        self.values[i][j]
    }
}

pub fn correlation_matrix(matrix: &FeatureMatrix) -> CorrelationMatrix {
    let n = matrix.ncols();
    let values = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let r = pearson(matrix.values.column(i), matrix.values.column(j));
                    if i == j {
                        r.map(|_| 1.0)
                    } else {
                        r
                    }
                })
                .collect()
        })
        .collect();

    CorrelationMatrix {
        features: matrix.columns.clone(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn matrix(values: Array2<f64>, columns: Vec<Feature>) -> FeatureMatrix {
        FeatureMatrix {
            regions: (0..values.nrows()).map(|i| format!("R{i}")).collect(),
            columns,
            values,
        }
    }

    fn outcome_matrix() -> FeatureMatrix {
        // outcome, identical copy, negation, constant, noisy positive
        matrix(
            array![
                [10.0, 10.0, 90.0, 50.0, 3.0],
                [25.0, 25.0, 75.0, 50.0, 9.0],
                [18.0, 18.0, 82.0, 50.0, 4.0],
                [31.0, 31.0, 69.0, 50.0, 12.0],
                [22.0, 22.0, 78.0, 50.0, 8.0],
            ],
            vec![
                Feature::LatestOutcome,
                Feature::ExclusiveFeeding,
                Feature::Immunization,
                Feature::CleanWater,
                Feature::Poverty,
            ],
        )
    }

    #[test]
    fn test_identity_and_negation() {
        let m = outcome_matrix();
        let same = correlate(&m, Feature::ExclusiveFeeding, Feature::LatestOutcome).unwrap();
        let negated = correlate(&m, Feature::Immunization, Feature::LatestOutcome).unwrap();
        assert!((same - 1.0).abs() < 1e-12);
        assert!((negated + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_has_insufficient_variance() {
        let m = outcome_matrix();
        let result = correlate(&m, Feature::CleanWater, Feature::LatestOutcome);
        assert!(matches!(
            result,
            Err(AnalysisError::InsufficientVariance { ref column }) if column == "Clean water access"
        ));
    }

    #[test]
    fn test_ranking_sorted_descending() {
        let m = outcome_matrix();
        let ranking = rank_against_outcome(&m, &m.columns).unwrap();

        // The outcome is not correlated with itself
        assert!(ranking.entries.iter().all(|e| e.feature != Feature::LatestOutcome));
        assert_eq!(ranking.entries.len(), 4);

        let defined: Vec<f64> = ranking.entries.iter().filter_map(|e| e.coefficient).collect();
        assert!(defined.windows(2).all(|w| w[0] >= w[1]));
        assert!(defined.iter().all(|c| (-1.0..=1.0).contains(c)));

        assert_eq!(ranking.entries[0].feature, Feature::ExclusiveFeeding);
        assert_eq!(ranking.entries.last().unwrap().feature, Feature::CleanWater);
        assert_eq!(ranking.entries.last().unwrap().coefficient, None);
        assert_eq!(ranking.undefined().count(), 1);

        let protective = ranking.protective_factors(-0.5);
        assert_eq!(protective.len(), 1);
        assert_eq!(protective[0].feature, Feature::Immunization);
    }

    #[test]
    fn test_constant_outcome_fails() {
        let m = matrix(
            array![[20.0, 1.0], [20.0, 2.0], [20.0, 3.0]],
            vec![Feature::LatestOutcome, Feature::Poverty],
        );
        assert!(matches!(
            rank_against_outcome(&m, &[Feature::Poverty]),
            Err(AnalysisError::InsufficientVariance { .. })
        ));
    }

    #[test]
    fn test_correlation_matrix_is_symmetric() {
        let m = outcome_matrix();
        let corr = correlation_matrix(&m);

        assert_eq!(corr.get(Feature::LatestOutcome, Feature::LatestOutcome), Some(1.0));
        assert_eq!(corr.get(Feature::CleanWater, Feature::CleanWater), None);
        assert_eq!(
            corr.get(Feature::Poverty, Feature::LatestOutcome),
            corr.get(Feature::LatestOutcome, Feature::Poverty)
        );
        assert_eq!(corr.get(Feature::Sanitation, Feature::Poverty), None);
    }
}
