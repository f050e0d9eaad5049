//! Human-readable analysis report

use crate::config::{AnalysisConfig, Feature, RecommendationThresholds};
use crate::model::{rank_by_outcome, ClusterProfile};
use crate::pipeline::{Analysis, EnrichedRegion};
use ndarray::Array1;
use std::fmt::{self, Write};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// Intervention suggested for a cluster whose average falls below a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Immunization,
    Sanitation,
    ExclusiveFeeding,
}

impl Recommendation {
    pub fn describe(self) -> &'static str {
        match self {
            Recommendation::Immunization => "PRIORITY: strengthen the immunization programme",
            Recommendation::Sanitation => "PRIORITY: improve sanitation access",
            Recommendation::ExclusiveFeeding => "PRIORITY: campaign for exclusive breastfeeding",
        }
    }
}

pub fn recommendations(
    profile: &ClusterProfile,
    thresholds: &RecommendationThresholds,
) -> Vec<Recommendation> {
    let below = |feature: Feature, limit: f64| profile.mean(feature).is_some_and(|m| m < limit);

    let mut out = Vec::new();
    if below(Feature::Immunization, thresholds.immunization) {
        out.push(Recommendation::Immunization);
    }
    if below(Feature::Sanitation, thresholds.sanitation) {
        out.push(Recommendation::Sanitation);
    }
    if below(Feature::ExclusiveFeeding, thresholds.exclusive_feeding) {
        out.push(Recommendation::ExclusiveFeeding);
    }
    out
}

/// count, mean, sample std, min, max
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

pub fn describe(values: &Array1<f64>) -> Option<ColumnStats> {
    let mean = values.mean()?;
    let std = (values.len() > 1).then(|| values.std(1.0));
    Some(ColumnStats {
        count: values.len(),
        mean,
        std,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{v:.1}%"))
}

fn section(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, "\n{RULE}")?;
    writeln!(out, "{title}")?;
    writeln!(out, "{RULE}")
}

/// Render the full report as text.
pub fn render_report(analysis: &Analysis, config: &AnalysisConfig) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let top_n = config.top_n;

    section(&mut out, "REGIONAL STUNTING ANALYSIS")?;
    writeln!(out, "Regions: {}", analysis.regions.len())?;
    writeln!(
        out,
        "Period: {} - {}",
        analysis.years.first().map(String::as_str).unwrap_or("?"),
        analysis.years.last().map(String::as_str).unwrap_or("?")
    )?;

    write_statistics(&mut out, analysis)?;
    write_trends(&mut out, analysis, top_n)?;
    write_clusters(&mut out, analysis)?;
    write_correlations(&mut out, analysis, config.protective_threshold)?;
    write_patterns(&mut out, analysis)?;
    write_priorities(&mut out, analysis, config)?;
    write_summary(&mut out, analysis, config)?;
    write_diagnostics(&mut out, analysis)?;

    Ok(out)
}

fn write_statistics(out: &mut String, analysis: &Analysis) -> fmt::Result {
    section(out, "[1] DESCRIPTIVE STATISTICS")?;
    writeln!(
        out,
        "{:<26} {:>5} {:>8} {:>8} {:>8} {:>8}",
        "Column", "count", "mean", "std", "min", "max"
    )?;
    writeln!(out, "{THIN_RULE}")?;

    let mut columns: Vec<(String, Array1<f64>)> = analysis
        .years
        .iter()
        .enumerate()
        .map(|(i, year)| {
            let values: Array1<f64> = analysis.regions.iter().map(|r| r.record.outcomes()[i]).collect();
            (format!("Prevalence {year}"), values)
        })
        .collect();
    for feature in Feature::INDICATORS {
        let values: Array1<f64> = analysis.regions.iter().map(|r| r.record.value(feature)).collect();
        columns.push((feature.label().to_string(), values));
    }

    for (name, values) in &columns {
        if let Some(stats) = describe(values) {
            let std = stats.std.map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
            writeln!(
                out,
                "{:<26} {:>5} {:>8.2} {:>8} {:>8.2} {:>8.2}",
                name, stats.count, stats.mean, std, stats.min, stats.max
            )?;
        }
    }
    Ok(())
}

fn write_region_line(out: &mut String, region: &EnrichedRegion) -> fmt::Result {
    let record = &region.record;
    writeln!(
        out,
        "  {:<28} {:>6.1} -> {:>6.1}  decline {:>6.1} ({:>9})  {}",
        record.name,
        record.first_outcome(),
        record.latest_outcome(),
        region.metrics.decline,
        pct(region.metrics.pct_decline),
        region.metrics.trend_direction().describe()
    )
}

fn write_trends(out: &mut String, analysis: &Analysis, top_n: usize) -> fmt::Result {
    section(out, "[2] TREND ANALYSIS")?;

    writeln!(out, "\nTop {top_n} regions by decline:")?;
    for region in analysis.top_by_decline(top_n) {
        write_region_line(out, region)?;
    }

    writeln!(out, "\nSmallest declines:")?;
    for region in analysis.bottom_by_decline(5) {
        write_region_line(out, region)?;
    }

    writeln!(out, "\nPer region group (latest year):")?;
    writeln!(
        out,
        "  {:<20} {:>7} {:>12} {:>12} {:>12}",
        "Group", "regions", "prevalence", "decline", "poverty"
    )?;
    for group in &analysis.groups {
        writeln!(
            out,
            "  {:<20} {:>7} {:>12.2} {:>12.2} {:>12.2}",
            group.group, group.regions, group.mean_latest, group.mean_decline, group.mean_poverty
        )?;
    }
    Ok(())
}

fn write_clusters(out: &mut String, analysis: &Analysis) -> fmt::Result {
    section(out, "[3] CLUSTERING")?;
    let model = &analysis.model;
    writeln!(
        out,
        "K = {}, features: {}",
        model.k,
        model
            .columns
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    )?;
    if !analysis.dropped_features.is_empty() {
        writeln!(
            out,
            "Dropped (zero variance): {}",
            analysis
                .dropped_features
                .iter()
                .map(|f| f.label())
                .collect::<Vec<_>>()
                .join(", ")
        )?;
    }
    writeln!(out, "Within-cluster sum of squares: {:.2}", model.inertia)?;
    writeln!(out, "Silhouette score: {:.3}", model.silhouette(&analysis.features))?;

    writeln!(out, "\nClusters, highest mean prevalence first:")?;
    for profile in rank_by_outcome(&analysis.profiles) {
        let share = profile.size() as f64 / analysis.regions.len() as f64 * 100.0;
        match (
            profile.mean(Feature::LatestOutcome),
            profile.mean(Feature::Poverty),
        ) {
            (Some(outcome), Some(poverty)) => writeln!(
                out,
                "\nCluster {} ({} regions, {:.1}%): mean stunting {:.1}%, mean poverty {:.1}%",
                profile.id,
                profile.size(),
                share,
                outcome,
                poverty
            )?,
            _ => writeln!(out, "\nCluster {} (empty)", profile.id)?,
        }
        if !profile.members.is_empty() {
            writeln!(out, "  Regions: {}", profile.members.join(", "))?;
        }
    }

    writeln!(out, "\nCluster means:")?;
    write!(out, "  {:>7}", "Cluster")?;
    for feature in Feature::ALL {
        write!(out, " {:>9}", feature.short())?;
    }
    writeln!(out)?;
    for profile in analysis.profiles.iter().filter(|p| p.size() > 0) {
        write!(out, "  {:>7}", profile.id)?;
        for feature in Feature::ALL {
            write!(out, " {:>9.2}", profile.mean(feature).unwrap_or(f64::NAN))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_correlations(out: &mut String, analysis: &Analysis, threshold: f64) -> fmt::Result {
    section(out, "[4] CORRELATION WITH STUNTING PREVALENCE")?;
    for entry in &analysis.correlations.entries {
        match entry.coefficient {
            Some(c) => writeln!(out, "  {:<26} {:>7.3}", entry.feature.label(), c)?,
            None => writeln!(out, "  {:<26} {:>7}", entry.feature.label(), "undefined")?,
        }
    }

    writeln!(out, "\nPositive: the factor rises with stunting. Negative: stunting falls as it rises.")?;
    let protective = analysis.correlations.protective_factors(threshold);
    if protective.is_empty() {
        writeln!(out, "No factor below {threshold:.2}.")?;
    } else {
        writeln!(out, "Strong protective factors (r < {threshold:.2}):")?;
        for entry in protective {
            writeln!(
                out,
                "  * {}: {:.3}",
                entry.feature.label(),
                entry.coefficient.unwrap_or_default()
            )?;
        }
    }
    Ok(())
}

fn write_patterns(out: &mut String, analysis: &Analysis) -> fmt::Result {
    section(out, "[5] PATTERN MINING")?;
    for (i, pattern) in analysis.patterns.iter().enumerate() {
        writeln!(out, "\n{}. {}:", i + 1, pattern.name)?;
        writeln!(out, "   Regions matched: {}", pattern.regions.len())?;
        if !pattern.regions.is_empty() {
            writeln!(out, "   Regions: {}", pattern.regions.join(", "))?;
        }
    }
    Ok(())
}

fn write_priorities(out: &mut String, analysis: &Analysis, config: &AnalysisConfig) -> fmt::Result {
    section(out, "[6] FORECAST & INTERVENTION PRIORITY")?;
    let next = analysis
        .years
        .last()
        .and_then(|y| y.parse::<i64>().ok())
        .map_or_else(|| "next year".to_string(), |y| (y + 1).to_string());

    writeln!(out, "\nTop {} priority regions:", config.top_n)?;
    writeln!(
        out,
        "  {:<28} {:>8} {:>10} {:>8} {:>8} {:>8}",
        "Region", "latest", format!("fc {next}"), "score", "immun.", "poverty"
    )?;
    for region in analysis.top_priority(config.top_n) {
        let record = &region.record;
        writeln!(
            out,
            "  {:<28} {:>8.2} {:>10.2} {:>8.2} {:>8.2} {:>8.2}",
            record.name,
            record.latest_outcome(),
            region.metrics.forecast_next,
            region.metrics.priority_score,
            record.indicators.immunization,
            record.indicators.poverty
        )?;
    }

    writeln!(out, "\nRecommendations per cluster:")?;
    for profile in analysis.profiles.iter().filter(|p| p.size() > 0) {
        writeln!(out, "\nCluster {}:", profile.id)?;
        let recs = recommendations(profile, &config.recommendations);
        if recs.is_empty() {
            writeln!(out, "  * maintain current programmes")?;
        }
        for rec in recs {
            writeln!(out, "  * {}", rec.describe())?;
        }
    }
    Ok(())
}

fn write_summary(out: &mut String, analysis: &Analysis, config: &AnalysisConfig) -> fmt::Result {
    section(out, "SUMMARY & POLICY RECOMMENDATIONS")?;
    let latest_year = analysis.years.last().map(String::as_str).unwrap_or("latest");

    writeln!(out, "\nKey findings:")?;
    writeln!(
        out,
        "1. National stunting prevalence {latest_year}: {:.1}%",
        analysis.national_mean_latest()
    )?;
    writeln!(out, "2. Mean decline over the period: {:.1} points", analysis.mean_decline())?;
    if let (Some(worst), Some(best)) = (analysis.worst_group(), analysis.best_group()) {
        writeln!(out, "3. Group with the highest prevalence: {}", worst.group)?;
        writeln!(out, "4. Group with the lowest prevalence: {}", best.group)?;
    }

    writeln!(out, "\nStrategy:")?;
    let focus: Vec<&str> = analysis
        .top_priority(3)
        .iter()
        .map(|r| r.record.name.as_str())
        .collect();
    writeln!(out, "1. Focus interventions on: {}", focus.join(", "))?;
    if let Some(cluster) = analysis.worst_cluster() {
        writeln!(
            out,
            "2. Cluster with the highest prevalence: Cluster {} ({})",
            cluster.id,
            cluster.members.join(", ")
        )?;
    }
    let protective = analysis.correlations.protective_factors(config.protective_threshold);
    if !protective.is_empty() {
        writeln!(out, "3. Protective factors to raise:")?;
        for entry in protective {
            writeln!(out, "   - {}", entry.feature.label())?;
        }
    }

    let forecast = analysis.mean_forecast();
    let gap = forecast - config.policy_target;
    writeln!(out, "\nTarget:")?;
    writeln!(out, "   Predicted national prevalence next year: {forecast:.1}%")?;
    writeln!(out, "   Policy target: {:.1}%", config.policy_target)?;
    if gap > 0.0 {
        writeln!(out, "   Gap to close: {gap:.1} points")?;
    } else {
        writeln!(out, "   On track: {:.1} points below target", -gap)?;
    }
    Ok(())
}

fn write_diagnostics(out: &mut String, analysis: &Analysis) -> fmt::Result {
    if analysis.diagnostics.is_empty() {
        return Ok(());
    }
    section(out, "WARNINGS")?;
    for d in &analysis.diagnostics {
        writeln!(out, "  [{}] {}: {}", d.stage, d.subject, d.message)?;
    }
    Ok(())
}
