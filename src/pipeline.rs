//! Ordered analysis pipeline over an immutable region table
//!
//! Every stage returns new data keyed by region name; results are joined back
//! by name, never by row position.

use crate::config::{AnalysisConfig, Feature};
use crate::correlation::{correlation_matrix, rank_against_outcome, CorrelationMatrix, CorrelationRanking};
use crate::data::{RegionRecord, RegionTable};
use crate::error::AnalysisError;
use crate::metrics::{self, DerivedMetrics};
use crate::model::{
    cluster_profiles, fit_kmeans, project_2d, rank_by_outcome, ClusterModel, ClusterParams,
    ClusterProfile, Projection,
};
use crate::pattern::{categorize_table, match_patterns, Categorized, Level, PatternMatch};
use crate::scaler::{standardize_lenient, FeatureMatrix};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A computation that was marked undefined instead of aborting the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: &'static str,
    /// Region or column the warning is about
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    fn new(stage: &'static str, subject: impl Into<String>, error: &AnalysisError) -> Self {
        let diagnostic = Self {
            stage,
            subject: subject.into(),
            message: error.to_string(),
        };
        warn!(stage, subject = %diagnostic.subject, "{}", diagnostic.message);
        diagnostic
    }
}

/// Input row plus everything derived for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRegion {
    pub record: RegionRecord,
    pub metrics: DerivedMetrics,
    pub cluster: usize,
    pub categories: BTreeMap<Feature, Level>,
}

impl Categorized for EnrichedRegion {
    fn region(&self) -> &str {
        &self.record.name
    }

    fn level(&self, feature: Feature) -> Option<Level> {
        self.categories.get(&feature).copied()
    }
}

/// Aggregates over one region group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group: String,
    pub regions: usize,
    pub mean_latest: f64,
    pub mean_decline: f64,
    pub mean_poverty: f64,
    /// Latest outcome of every member, for distribution charts
    pub latest_values: Vec<f64>,
}

/// Complete result of one run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub years: Vec<String>,
    /// Input order
    pub regions: Vec<EnrichedRegion>,
    /// Standardized clustering features
    pub features: FeatureMatrix,
    /// Columns excluded from clustering for zero variance
    pub dropped_features: Vec<Feature>,
    pub model: ClusterModel,
    pub profiles: Vec<ClusterProfile>,
    pub projection: Option<Projection>,
    pub correlations: CorrelationRanking,
    pub correlation_matrix: CorrelationMatrix,
    pub patterns: Vec<PatternMatch>,
    pub groups: Vec<GroupSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run every stage in order: derived metrics, standardization, clustering,
/// projection, correlation, categorization and pattern matching, group aggregates.
pub fn analyze(
    table: &RegionTable,
    config: &AnalysisConfig,
    params: &ClusterParams,
) -> Result<Analysis, AnalysisError> {
    if table.is_empty() {
        return Err(AnalysisError::Empty);
    }
    let mut diagnostics = Vec::new();

    // Derived metrics
    let derived: BTreeMap<&str, DerivedMetrics> = table
        .records()
        .iter()
        .map(|record| (record.name.as_str(), metrics::derive(record, &config.weights)))
        .collect();
    for record in table.records() {
        let name = record.name.as_str();
        if derived[name].pct_decline.is_none() {
            let error = AnalysisError::DivisionUndefined {
                region: name.to_string(),
            };
            diagnostics.push(Diagnostic::new("metrics", name, &error));
        }
    }
    debug!(regions = derived.len(), "derived metrics computed");

    // Standardization and clustering
    let raw = FeatureMatrix::from_table(table, &config.cluster_features);
    let standardized = standardize_lenient(&raw)?;
    for feature in &standardized.dropped {
        let error = AnalysisError::DegenerateColumn {
            column: feature.label().to_string(),
        };
        diagnostics.push(Diagnostic::new("standardize", feature.label(), &error));
    }
    let model = fit_kmeans(&standardized.matrix, params)?;
    let profiles = cluster_profiles(table, &model);

    let projection = match project_2d(&standardized.matrix) {
        Ok(projection) => Some(projection),
        Err(e) => {
            diagnostics.push(Diagnostic::new("projection", "features", &e));
            None
        }
    };

    // Correlation
    let mut correlation_columns = vec![Feature::LatestOutcome];
    correlation_columns.extend(
        config
            .correlation_features
            .iter()
            .filter(|&&f| f != Feature::LatestOutcome),
    );
    let correlation_input = FeatureMatrix::from_table(table, &correlation_columns);
    let correlations = rank_against_outcome(&correlation_input, &correlation_columns)?;
    for entry in correlations.undefined() {
        let error = AnalysisError::InsufficientVariance {
            column: entry.feature.label().to_string(),
        };
        diagnostics.push(Diagnostic::new("correlation", entry.feature.label(), &error));
    }
    let correlation_matrix = correlation_matrix(&correlation_input);

    // Categorization
    let categorized = categorize_table(table, &config.buckets)?;
    let categories: BTreeMap<&str, &BTreeMap<Feature, Level>> = categorized
        .iter()
        .map(|row| (row.region.as_str(), &row.levels))
        .collect();

    let mut regions = Vec::with_capacity(table.len());
    for record in table.records() {
        let name = record.name.as_str();
        let cluster = model.cluster_of(name).ok_or_else(|| {
            AnalysisError::Clustering(format!("region `{name}` has no cluster assignment"))
        })?;

        regions.push(EnrichedRegion {
            record: record.clone(),
            metrics: derived[name],
            cluster,
            categories: categories.get(name).map(|levels| (*levels).clone()).unwrap_or_default(),
        });
    }

    // Patterns over the enriched regions
    let patterns = match_patterns(&config.patterns, &regions);
    let groups = group_summaries(&regions);

    info!(
        regions = regions.len(),
        clusters = model.k,
        diagnostics = diagnostics.len(),
        "analysis complete"
    );

    Ok(Analysis {
        years: table.years().to_vec(),
        regions,
        features: standardized.matrix,
        dropped_features: standardized.dropped,
        model,
        profiles,
        projection,
        correlations,
        correlation_matrix,
        patterns,
        groups,
        diagnostics,
    })
}

/// Per-group means, groups sorted by name.
pub fn group_summaries(regions: &[EnrichedRegion]) -> Vec<GroupSummary> {
    let mut by_group: BTreeMap<&str, Vec<&EnrichedRegion>> = BTreeMap::new();
    for region in regions {
        by_group.entry(region.record.group.as_str()).or_default().push(region);
    }

    by_group
        .into_iter()
        .map(|(group, members)| {
            GroupSummary {
                group: group.to_string(),
                regions: members.len(),
                mean_latest: mean_by(&members, |r| r.record.latest_outcome()),
                mean_decline: mean_by(&members, |r| r.metrics.decline),
                mean_poverty: mean_by(&members, |r| r.record.indicators.poverty),
                latest_values: members.iter().map(|r| r.record.latest_outcome()).collect(),
            }
        })
        .collect()
}

fn mean_by(members: &[&EnrichedRegion], value: impl Fn(&EnrichedRegion) -> f64) -> f64 {
    members.iter().map(|&r| value(r)).sum::<f64>() / members.len() as f64
}

fn descending(a: f64, b: f64, tie: (&str, &str)) -> Ordering {
    b.total_cmp(&a).then_with(|| tie.0.cmp(tie.1))
}

impl Analysis {
    pub fn region(&self, name: &str) -> Option<&EnrichedRegion> {
        self.regions.iter().find(|r| r.record.name == name)
    }

    fn sorted_by(&self, key: impl Fn(&EnrichedRegion) -> f64) -> Vec<&EnrichedRegion> {
        let mut sorted: Vec<&EnrichedRegion> = self.regions.iter().collect();
        sorted.sort_by(|a, b| descending(key(*a), key(*b), (a.record.name.as_str(), b.record.name.as_str())));
        sorted
    }

    /// Largest declines first.
    pub fn top_by_decline(&self, n: usize) -> Vec<&EnrichedRegion> {
        self.sorted_by(|r| r.metrics.decline).into_iter().take(n).collect()
    }

    /// Smallest declines (or increases) first.
    pub fn bottom_by_decline(&self, n: usize) -> Vec<&EnrichedRegion> {
        self.sorted_by(|r| -r.metrics.decline).into_iter().take(n).collect()
    }

    /// Highest latest prevalence first.
    pub fn worst_by_latest(&self, n: usize) -> Vec<&EnrichedRegion> {
        self.sorted_by(|r| r.record.latest_outcome()).into_iter().take(n).collect()
    }

    pub fn top_priority(&self, n: usize) -> Vec<&EnrichedRegion> {
        self.sorted_by(|r| r.metrics.priority_score).into_iter().take(n).collect()
    }

    fn mean_of(&self, f: impl Fn(&EnrichedRegion) -> f64) -> f64 {
        self.regions.iter().map(f).sum::<f64>() / self.regions.len() as f64
    }

    pub fn national_mean_latest(&self) -> f64 {
        self.mean_of(|r| r.record.latest_outcome())
    }

    pub fn mean_decline(&self) -> f64 {
        self.mean_of(|r| r.metrics.decline)
    }

    pub fn mean_forecast(&self) -> f64 {
        self.mean_of(|r| r.metrics.forecast_next)
    }

    pub fn worst_group(&self) -> Option<&GroupSummary> {
        self.groups
            .iter()
            .max_by(|a, b| a.mean_latest.total_cmp(&b.mean_latest))
    }

    pub fn best_group(&self) -> Option<&GroupSummary> {
        self.groups
            .iter()
            .min_by(|a, b| a.mean_latest.total_cmp(&b.mean_latest))
    }

    /// Cluster with the highest mean prevalence, found through aggregates.
    pub fn worst_cluster(&self) -> Option<&ClusterProfile> {
        rank_by_outcome(&self.profiles)
            .into_iter()
            .find(|p| p.size() > 0)
    }
}
