//! Column schema, feature names and the policy constants that drive the analysis

use crate::error::LoadError;
use crate::metrics::PriorityWeights;
use crate::pattern::{default_buckets, default_patterns, BucketSpec, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Numeric variables available on every region.
///
/// `LatestOutcome` is the most recent year of the outcome series; the rest are
/// the percentage indicators used as risk factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    LatestOutcome,
    Immunization,
    ExclusiveFeeding,
    CleanWater,
    Sanitation,
    Poverty,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::LatestOutcome,
        Feature::Immunization,
        Feature::ExclusiveFeeding,
        Feature::CleanWater,
        Feature::Sanitation,
        Feature::Poverty,
    ];

    /// Every feature except the outcome.
    pub const INDICATORS: [Feature; 5] = [
        Feature::Immunization,
        Feature::ExclusiveFeeding,
        Feature::CleanWater,
        Feature::Sanitation,
        Feature::Poverty,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Feature::LatestOutcome => "Stunting prevalence",
            Feature::Immunization => "Immunization coverage",
            Feature::ExclusiveFeeding => "Exclusive breastfeeding",
            Feature::CleanWater => "Clean water access",
            Feature::Sanitation => "Sanitation access",
            Feature::Poverty => "Poverty rate",
        }
    }

    /// Compact label for chart axes.
    pub fn short(self) -> &'static str {
        match self {
            Feature::LatestOutcome => "Stunting",
            Feature::Immunization => "Immun.",
            Feature::ExclusiveFeeding => "Breastf.",
            Feature::CleanWater => "Water",
            Feature::Sanitation => "Sanit.",
            Feature::Poverty => "Poverty",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Input column names. This is the only part of the analysis that can be
/// changed from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSchema {
    pub name: String,
    pub group: String,
    /// Outcome columns in chronological order
    pub outcomes: Vec<String>,
    /// Display label for each outcome column
    pub years: Vec<String>,
    pub immunization: String,
    pub exclusive_feeding: String,
    pub clean_water: String,
    pub sanitation: String,
    pub poverty: String,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        let years = ["2021", "2022", "2023", "2024"];
        Self {
            name: "Provinsi".to_string(),
            group: "Region".to_string(),
            outcomes: years.iter().map(|y| format!("Prevalensi_{y}")).collect(),
            years: years.iter().map(|y| y.to_string()).collect(),
            immunization: "Cakupan_Imunisasi".to_string(),
            exclusive_feeding: "Cakupan_ASI_Eksklusif".to_string(),
            clean_water: "Akses_Air_Bersih".to_string(),
            sanitation: "Akses_Sanitasi".to_string(),
            poverty: "Tingkat_Kemiskinan".to_string(),
        }
    }
}

impl ColumnSchema {
    /// Read a schema override from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let schema: ColumnSchema =
            serde_json::from_str(&text).map_err(|e| LoadError::Schema(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.outcomes.len() < 2 {
            return Err(LoadError::Schema(format!(
                "need at least two outcome columns, got {}",
                self.outcomes.len()
            )));
        }
        if self.years.len() != self.outcomes.len() {
            return Err(LoadError::Schema(format!(
                "{} year labels for {} outcome columns",
                self.years.len(),
                self.outcomes.len()
            )));
        }
        Ok(())
    }

    /// Column holding the given feature in the input file.
    pub fn column(&self, feature: Feature) -> &str {
        match feature {
            Feature::LatestOutcome => self.outcomes.last().map(String::as_str).unwrap_or_default(),
            Feature::Immunization => &self.immunization,
            Feature::ExclusiveFeeding => &self.exclusive_feeding,
            Feature::CleanWater => &self.clean_water,
            Feature::Sanitation => &self.sanitation,
            Feature::Poverty => &self.poverty,
        }
    }
}

/// Cluster-level averages below which an intervention is recommended.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationThresholds {
    pub immunization: f64,
    pub sanitation: f64,
    pub exclusive_feeding: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            immunization: 70.0,
            sanitation: 80.0,
            exclusive_feeding: 75.0,
        }
    }
}

/// Policy constants for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub weights: PriorityWeights,
    /// Columns standardized and fed to clustering and the projection
    pub cluster_features: Vec<Feature>,
    /// Columns correlated against the outcome
    pub correlation_features: Vec<Feature>,
    pub buckets: Vec<BucketSpec>,
    pub patterns: Vec<Pattern>,
    /// Coefficients below this are reported as protective factors
    pub protective_threshold: f64,
    pub recommendations: RecommendationThresholds,
    /// National prevalence target the forecast is compared against
    pub policy_target: f64,
    /// Length of the ranked lists in the report
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weights: PriorityWeights::default(),
            cluster_features: Feature::ALL.to_vec(),
            correlation_features: Feature::INDICATORS.to_vec(),
            buckets: default_buckets(),
            patterns: default_patterns(),
            protective_threshold: -0.5,
            recommendations: RecommendationThresholds::default(),
            policy_target: 18.8,
            top_n: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_schema_columns() {
        let schema = ColumnSchema::default();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.column(Feature::LatestOutcome), "Prevalensi_2024");
        assert_eq!(schema.column(Feature::Poverty), "Tingkat_Kemiskinan");
        assert_eq!(schema.outcomes.len(), schema.years.len());
    }

    #[test]
    fn test_schema_override_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "name": "District", "group": "Zone" }}"#).unwrap();

        let schema = ColumnSchema::from_json_file(file.path()).unwrap();
        assert_eq!(schema.name, "District");
        assert_eq!(schema.group, "Zone");
        assert_eq!(schema.immunization, "Cakupan_Imunisasi");
    }

    #[test]
    fn test_schema_rejects_mismatched_years() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "outcomes": ["a", "b", "c"], "years": ["1", "2"] }}"#).unwrap();

        let result = ColumnSchema::from_json_file(file.path());
        assert!(matches!(result, Err(LoadError::Schema(_))));
    }

    #[test]
    fn test_schema_rejects_single_year() {
        let schema = ColumnSchema {
            outcomes: vec!["only".to_string()],
            years: vec!["2024".to_string()],
            ..ColumnSchema::default()
        };
        assert!(schema.validate().is_err());
    }
}
