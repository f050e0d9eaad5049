//! Feature matrices keyed by region and zero-mean / unit-variance scaling

use crate::config::Feature;
use crate::data::RegionTable;
use crate::error::AnalysisError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::debug;

/// Below this a column's standard deviation is treated as zero
const MIN_STD: f64 = 1e-12;

/// Numeric matrix with the region name of every row and the feature of every column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub regions: Vec<String>,
    pub columns: Vec<Feature>,
    /// Shape (regions, columns)
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    /// Raw feature values in table order.
    pub fn from_table(table: &RegionTable, columns: &[Feature]) -> Self {
        let regions = table.records().iter().map(|r| r.name.clone()).collect();
        let values = Array2::from_shape_fn((table.len(), columns.len()), |(row, col)| {
            table.records()[row].value(columns[col])
        });

        Self {
            regions,
            columns: columns.to_vec(),
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row_of(&self, region: &str) -> Option<ArrayView1<'_, f64>> {
        self.regions
            .iter()
            .position(|r| r == region)
            .map(|i| self.values.row(i))
    }

    pub fn column_of(&self, feature: Feature) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|&f| f == feature)
            .map(|i| self.values.column(i))
    }

    fn select_columns(&self, keep: &[usize]) -> Self {
        Self {
            regions: self.regions.clone(),
            columns: keep.iter().map(|&i| self.columns[i]).collect(),
            values: self.values.select(Axis(1), keep),
        }
    }
}

/// Per-column mean and population standard deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub columns: Vec<Feature>,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl StandardScaler {
    /// Fit on every column of the matrix.
    ///
    /// Fails with `DegenerateColumn` for the first column whose standard deviation is zero.
    pub fn fit(matrix: &FeatureMatrix) -> Result<Self, AnalysisError> {
        let (mean, std) = column_moments(matrix)?;
        if let Some(i) = std.iter().position(|&s| s < MIN_STD) {
            return Err(AnalysisError::DegenerateColumn {
                column: matrix.columns[i].label().to_string(),
            });
        }

        Ok(Self {
            columns: matrix.columns.clone(),
            mean,
            std,
        })
    }

    /// Rescale a matrix with the fitted moments. Row order and identity are kept.
    pub fn transform(&self, matrix: &FeatureMatrix) -> FeatureMatrix {
        FeatureMatrix {
            regions: matrix.regions.clone(),
            columns: matrix.columns.clone(),
            values: (&matrix.values - &self.mean) / &self.std,
        }
    }
}

/// Result of standardizing with degenerate columns removed.
#[derive(Debug, Clone)]
pub struct Standardized {
    pub matrix: FeatureMatrix,
    pub scaler: StandardScaler,
    /// Zero-variance columns left out of `matrix`
    pub dropped: Vec<Feature>,
}

/// Drop zero-variance columns, then fit and transform the rest.
///
/// Fails with `DegenerateColumn` only when no column is left.
pub fn standardize_lenient(matrix: &FeatureMatrix) -> Result<Standardized, AnalysisError> {
    let (_, std) = column_moments(matrix)?;

    let (keep, dropped): (Vec<usize>, Vec<usize>) =
        (0..matrix.ncols()).partition(|&i| std[i] >= MIN_STD);
    let dropped: Vec<Feature> = dropped.into_iter().map(|i| matrix.columns[i]).collect();
    for feature in &dropped {
        debug!(column = %feature, "zero-variance column dropped before clustering");
    }

    if keep.is_empty() {
        return Err(AnalysisError::DegenerateColumn {
            column: dropped
                .first()
                .map(|f| f.label().to_string())
                .unwrap_or_default(),
        });
    }

    let kept = matrix.select_columns(&keep);
    let scaler = StandardScaler::fit(&kept)?;
    Ok(Standardized {
        matrix: scaler.transform(&kept),
        scaler,
        dropped,
    })
}

fn column_moments(matrix: &FeatureMatrix) -> Result<(Array1<f64>, Array1<f64>), AnalysisError> {
    let mean = matrix
        .values
        .mean_axis(Axis(0))
        .ok_or(AnalysisError::Empty)?;
    let std = matrix.values.std_axis(Axis(0), 0.0);
    Ok((mean, std))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(values: Array2<f64>, columns: Vec<Feature>) -> FeatureMatrix {
        FeatureMatrix {
            regions: (0..values.nrows()).map(|i| format!("R{i}")).collect(),
            columns,
            values,
        }
    }

    #[test]
    fn test_standardized_moments() {
        let m = matrix(
            array![[10.0, 60.0], [20.0, 70.0], [35.0, 65.0], [15.0, 90.0]],
            vec![Feature::LatestOutcome, Feature::Immunization],
        );
        let scaler = StandardScaler::fit(&m).unwrap();
        let scaled = scaler.transform(&m);

        for column in scaled.values.columns() {
            let mean = column.mean().unwrap();
            let std = column.std(0.0);
            assert!(mean.abs() < 1e-10, "mean {mean}");
            assert!((std - 1.0).abs() < 1e-10, "std {std}");
        }
        assert_eq!(scaled.regions, m.regions);
    }

    #[test]
    fn test_constant_column_is_degenerate() {
        let m = matrix(
            array![[10.0, 50.0], [20.0, 50.0], [30.0, 50.0]],
            vec![Feature::LatestOutcome, Feature::Sanitation],
        );
        let result = StandardScaler::fit(&m);
        assert!(matches!(
            result,
            Err(AnalysisError::DegenerateColumn { ref column }) if column == "Sanitation access"
        ));
    }

    #[test]
    fn test_lenient_drops_constant_column() {
        let m = matrix(
            array![[10.0, 50.0, 1.0], [20.0, 50.0, 3.0], [30.0, 50.0, 2.0]],
            vec![Feature::LatestOutcome, Feature::Sanitation, Feature::Poverty],
        );
        let standardized = standardize_lenient(&m).unwrap();
        assert_eq!(standardized.dropped, vec![Feature::Sanitation]);
        assert_eq!(
            standardized.matrix.columns,
            vec![Feature::LatestOutcome, Feature::Poverty]
        );
        assert_eq!(standardized.matrix.values.ncols(), 2);
    }

    #[test]
    fn test_lenient_fails_when_nothing_left() {
        let m = matrix(array![[5.0], [5.0]], vec![Feature::Poverty]);
        assert!(standardize_lenient(&m).is_err());
    }

    #[test]
    fn test_row_lookup_by_region() {
        let m = matrix(
            array![[1.0, 2.0], [3.0, 4.0]],
            vec![Feature::Poverty, Feature::CleanWater],
        );
        assert_eq!(m.row_of("R1").unwrap().to_vec(), vec![3.0, 4.0]);
        assert_eq!(m.column_of(Feature::CleanWater).unwrap().to_vec(), vec![2.0, 4.0]);
        assert!(m.row_of("missing").is_none());
    }
}
