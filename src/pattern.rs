//! Ordinal bucketing of continuous columns and co-occurrence pattern filters

use crate::config::Feature;
use crate::data::RegionTable;
use crate::error::AnalysisError;
use std::collections::BTreeMap;
use std::fmt;

/// Ordinal category label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Low => "Low",
            Level::Medium => "Medium",
            Level::High => "High",
            Level::VeryHigh => "Very High",
        })
    }
}

/// Contiguous, non-overlapping ranges over one feature.
///
/// Bucket `i` covers `[bounds[i], bounds[i + 1])`, so a value sitting exactly on
/// an interior boundary belongs to the upper bucket. The lowest bound is
/// inclusive, and a finite highest bound is inclusive too. Anything outside is
/// `OutOfRange`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSpec {
    feature: Feature,
    bounds: Vec<f64>,
    levels: Vec<Level>,
}

impl BucketSpec {
    pub fn new(feature: Feature, bounds: Vec<f64>, levels: Vec<Level>) -> Result<Self, AnalysisError> {
        let invalid = |reason: String| AnalysisError::InvalidBuckets {
            column: feature.label().to_string(),
            reason,
        };

        if levels.is_empty() || bounds.len() != levels.len() + 1 {
            return Err(invalid(format!(
                "{} bounds for {} labels",
                bounds.len(),
                levels.len()
            )));
        }
        if !bounds[0].is_finite() {
            return Err(invalid("lowest bound must be finite".to_string()));
        }
        if bounds.iter().any(|b| b.is_nan()) {
            return Err(invalid("bounds must not be NaN".to_string()));
        }
        if !bounds.windows(2).all(|w| w[0] < w[1]) {
            return Err(invalid("bounds must be strictly increasing".to_string()));
        }

        Ok(Self {
            feature,
            bounds,
            levels,
        })
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// `(level, lower, upper)` for every bucket in ascending order.
    pub fn buckets(&self) -> impl Iterator<Item = (Level, f64, f64)> + '_ {
        self.levels
            .iter()
            .zip(self.bounds.windows(2))
            .map(|(&level, w)| (level, w[0], w[1]))
    }

    pub fn level_for(&self, value: f64) -> Option<Level> {
        if let Some((level, _, _)) = self
            .buckets()
            .find(|&(_, lower, upper)| value >= lower && value < upper)
        {
            return Some(level);
        }

        let top = self.bounds[self.bounds.len() - 1];
        if top.is_finite() && value == top {
            return self.levels.last().copied();
        }
        None
    }

    /// Label a region's value, failing loudly when it lies outside every bucket.
    pub fn categorize(&self, region: &str, value: f64) -> Result<Level, AnalysisError> {
        self.level_for(value).ok_or_else(|| AnalysisError::OutOfRange {
            region: region.to_string(),
            column: self.feature.label().to_string(),
            value,
        })
    }
}

/// Reference boundaries for the four bucketed columns.
pub fn default_buckets() -> Vec<BucketSpec> {
    use Level::*;
    // Strictly increasing with a finite lower edge, as `BucketSpec::new` requires
    let spec = |feature, bounds: &[f64], levels: &[Level]| BucketSpec {
        feature,
        bounds: bounds.to_vec(),
        levels: levels.to_vec(),
    };

    vec![
        spec(Feature::LatestOutcome, &[0.0, 15.0, 20.0, 30.0, f64::INFINITY], &[Low, Medium, High, VeryHigh]),
        spec(Feature::Immunization, &[0.0, 65.0, 75.0, 100.0], &[Low, Medium, High]),
        spec(Feature::Poverty, &[0.0, 7.0, 12.0, 100.0], &[Low, Medium, High]),
        spec(Feature::Sanitation, &[0.0, 75.0, 85.0, 100.0], &[Low, Medium, High]),
    ]
}

/// Anything that carries ordinal labels per feature.
pub trait Categorized {
    fn region(&self) -> &str;
    fn level(&self, feature: Feature) -> Option<Level>;
}

/// Labels of one region for every bucketed feature.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedRow {
    pub region: String,
    pub levels: BTreeMap<Feature, Level>,
}

impl Categorized for CategorizedRow {
    fn region(&self) -> &str {
        &self.region
    }

    fn level(&self, feature: Feature) -> Option<Level> {
        self.levels.get(&feature).copied()
    }
}

/// Label every region for every bucket spec. The first out-of-range value aborts.
pub fn categorize_table(
    table: &RegionTable,
    specs: &[BucketSpec],
) -> Result<Vec<CategorizedRow>, AnalysisError> {
    table
        .records()
        .iter()
        .map(|record| {
            let levels = specs
                .iter()
                .map(|spec| {
                    let level = spec.categorize(&record.name, record.value(spec.feature()))?;
                    Ok((spec.feature(), level))
                })
                .collect::<Result<BTreeMap<_, _>, AnalysisError>>()?;

            Ok(CategorizedRow {
                region: record.name.clone(),
                levels,
            })
        })
        .collect()
}

/// One term of a pattern: the feature's label must be one of `accepted`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub feature: Feature,
    pub accepted: Vec<Level>,
}

impl Condition {
    pub fn is(feature: Feature, level: Level) -> Self {
        Self {
            feature,
            accepted: vec![level],
        }
    }

    pub fn any_of(feature: Feature, levels: &[Level]) -> Self {
        Self {
            feature,
            accepted: levels.to_vec(),
        }
    }

    fn holds<T: Categorized + ?Sized>(&self, row: &T) -> bool {
        row.level(self.feature)
            .is_some_and(|level| self.accepted.contains(&level))
    }
}

/// Named conjunction of conditions over ordinal labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }

    pub fn matches<T: Categorized + ?Sized>(&self, row: &T) -> bool {
        self.conditions.iter().all(|c| c.holds(row))
    }

    /// Rows satisfying every condition, in input order.
    pub fn filter<'a, T, I>(&self, rows: I) -> Vec<&'a T>
    where
        T: Categorized + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        rows.into_iter().filter(|row| self.matches(*row)).collect()
    }
}

/// Regions matched by one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub name: String,
    pub regions: Vec<String>,
}

pub fn match_patterns<T: Categorized>(patterns: &[Pattern], rows: &[T]) -> Vec<PatternMatch> {
    patterns
        .iter()
        .map(|pattern| PatternMatch {
            name: pattern.name.clone(),
            regions: pattern
                .filter(rows)
                .into_iter()
                .map(|row| row.region().to_string())
                .collect(),
        })
        .collect()
}

pub fn default_patterns() -> Vec<Pattern> {
    use Level::*;
    vec![
        Pattern::new(
            "High stunting + high poverty",
            vec![
                Condition::any_of(Feature::LatestOutcome, &[High, VeryHigh]),
                Condition::is(Feature::Poverty, High),
            ],
        ),
        Pattern::new(
            "Low stunting + high immunization + high sanitation",
            vec![
                Condition::is(Feature::LatestOutcome, Low),
                Condition::is(Feature::Immunization, High),
                Condition::is(Feature::Sanitation, High),
            ],
        ),
        Pattern::new(
            "High stunting + low immunization",
            vec![
                Condition::any_of(Feature::LatestOutcome, &[High, VeryHigh]),
                Condition::is(Feature::Immunization, Low),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_spec() -> BucketSpec {
        default_buckets()
            .into_iter()
            .find(|s| s.feature() == Feature::LatestOutcome)
            .unwrap()
    }

    fn row(region: &str, levels: &[(Feature, Level)]) -> CategorizedRow {
        CategorizedRow {
            region: region.to_string(),
            levels: levels.iter().copied().collect(),
        }
    }

    #[test]
    fn test_default_buckets_are_valid() {
        let specs = default_buckets();
        let features: Vec<Feature> = specs.iter().map(|s| s.feature()).collect();
        assert_eq!(
            features,
            vec![Feature::LatestOutcome, Feature::Immunization, Feature::Poverty, Feature::Sanitation]
        );

        for spec in specs {
            let rebuilt = BucketSpec::new(spec.feature, spec.bounds.clone(), spec.levels.clone()).unwrap();
            assert_eq!(rebuilt, spec);
        }
    }

    #[test]
    fn test_boundary_goes_to_upper_bucket() {
        let spec = outcome_spec();
        assert_eq!(spec.level_for(0.0), Some(Level::Low));
        assert_eq!(spec.level_for(14.999), Some(Level::Low));
        assert_eq!(spec.level_for(15.0), Some(Level::Medium));
        assert_eq!(spec.level_for(20.0), Some(Level::High));
        assert_eq!(spec.level_for(30.0), Some(Level::VeryHigh));
        assert_eq!(spec.level_for(100.0), Some(Level::VeryHigh));
    }

    #[test]
    fn test_finite_top_bound_is_inclusive() {
        let spec = BucketSpec::new(
            Feature::Immunization,
            vec![0.0, 65.0, 75.0, 100.0],
            vec![Level::Low, Level::Medium, Level::High],
        )
        .unwrap();
        assert_eq!(spec.level_for(65.0), Some(Level::Medium));
        assert_eq!(spec.level_for(75.0), Some(Level::High));
        assert_eq!(spec.level_for(100.0), Some(Level::High));
        assert_eq!(spec.level_for(100.5), None);
    }

    #[test]
    fn test_out_of_range_fails_loudly() {
        let spec = outcome_spec();
        let result = spec.categorize("Nowhere", -0.1);
        assert!(matches!(
            result,
            Err(AnalysisError::OutOfRange { ref region, value, .. }) if region == "Nowhere" && value == -0.1
        ));
        assert!(spec.categorize("Nowhere", f64::NAN).is_err());
    }

    #[test]
    fn test_buckets_partition_declared_range() {
        for spec in default_buckets() {
            let buckets: Vec<_> = spec.buckets().collect();
            for pair in buckets.windows(2) {
                // Each upper bound is the next lower bound: no gaps, no overlaps
                assert_eq!(pair[0].2, pair[1].1);
            }

            let lower = buckets[0].1;
            let upper = buckets[buckets.len() - 1].2.min(100.0);
            let mut value = lower;
            while value <= upper {
                let hits = buckets
                    .iter()
                    .filter(|&&(_, lo, hi)| value >= lo && value < hi)
                    .count();
                assert!(hits <= 1, "{value} in {hits} buckets");
                assert!(spec.level_for(value).is_some(), "{value} unassigned");
                value += 0.25;
            }
        }
    }

    #[test]
    fn test_invalid_bucket_specs() {
        let overlapping = BucketSpec::new(
            Feature::Poverty,
            vec![0.0, 10.0, 10.0],
            vec![Level::Low, Level::High],
        );
        assert!(matches!(overlapping, Err(AnalysisError::InvalidBuckets { .. })));

        let mismatched = BucketSpec::new(Feature::Poverty, vec![0.0, 10.0], vec![Level::Low, Level::High]);
        assert!(mismatched.is_err());

        let open_bottom = BucketSpec::new(
            Feature::Poverty,
            vec![f64::NEG_INFINITY, 10.0],
            vec![Level::Low],
        );
        assert!(open_bottom.is_err());
    }

    #[test]
    fn test_pattern_conjunction() {
        let patterns = default_patterns();
        let rows = vec![
            row("A", &[(Feature::LatestOutcome, Level::VeryHigh), (Feature::Poverty, Level::High)]),
            row("B", &[(Feature::LatestOutcome, Level::High), (Feature::Poverty, Level::Medium)]),
            row("C", &[(Feature::LatestOutcome, Level::Low), (Feature::Poverty, Level::High)]),
        ];

        let matched = patterns[0].filter(&rows);
        let names: Vec<&str> = matched.iter().map(|r| r.region()).collect();
        assert_eq!(names, vec!["A"]);

        // A missing label never satisfies a condition
        assert!(patterns[2].filter(&rows).is_empty());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let pattern = &default_patterns()[2];
        let rows = vec![
            row("A", &[(Feature::LatestOutcome, Level::High), (Feature::Immunization, Level::Low)]),
            row("B", &[(Feature::LatestOutcome, Level::Low), (Feature::Immunization, Level::Low)]),
            row("C", &[(Feature::LatestOutcome, Level::VeryHigh), (Feature::Immunization, Level::Low)]),
        ];

        let once = pattern.filter(&rows);
        let twice = pattern.filter(once.iter().copied());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_match_patterns_names_regions() {
        let rows = vec![row(
            "Bali",
            &[
                (Feature::LatestOutcome, Level::Low),
                (Feature::Immunization, Level::High),
                (Feature::Sanitation, Level::High),
                (Feature::Poverty, Level::Low),
            ],
        )];
        let matches = match_patterns(&default_patterns(), &rows);
        assert_eq!(matches.len(), 3);
        assert!(matches[0].regions.is_empty());
        assert_eq!(matches[1].regions, vec!["Bali".to_string()]);
        assert!(matches[2].regions.is_empty());
    }
}
