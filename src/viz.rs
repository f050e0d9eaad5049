//! Chart rendering with Plotters
//!
//! Every chart is a PNG written into one output directory. The functions only
//! read a finished [`Analysis`]; nothing here feeds back into the numbers.

use crate::config::Feature;
use crate::correlation::CorrelationMatrix;
use crate::pipeline::Analysis;
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 8] = [
    RED,
    BLUE,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),
    RGBColor(128, 0, 128),
    RGBColor(139, 69, 19),
];

const MISSING: RGBColor = RGBColor(200, 200, 200);

pub const TREND_WORST: &str = "trend_worst.png";
pub const TOP_DECLINES: &str = "top_declines.png";
pub const POVERTY_VS_OUTCOME: &str = "poverty_vs_outcome.png";
pub const OUTCOME_BY_GROUP: &str = "outcome_by_group.png";
pub const CORRELATION_HEATMAP: &str = "correlation_heatmap.png";
pub const CLUSTER_PROJECTION: &str = "cluster_projection.png";

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS[cluster % CLUSTER_COLORS.len()]
}

/// Axis label for an integer tick, empty between ticks.
fn label_at(labels: &[String], x: f64) -> String {
    let index = x.round();
    if (x - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

/// Diverging blue-white-red scale for coefficients in [-1, 1].
fn coolwarm(r: Option<f64>) -> RGBColor {
    const COLD: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const MID: (f64, f64, f64) = (240.0, 240.0, 240.0);
    const WARM: (f64, f64, f64) = (180.0, 4.0, 38.0);

    let Some(r) = r else {
        return MISSING;
    };
    let r = r.clamp(-1.0, 1.0);
    let (from, to, t) = if r < 0.0 { (MID, COLD, -r) } else { (MID, WARM, r) };
    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

/// Min..max of the values widened by `pad` of the span on each side.
fn padded_range(values: impl IntoIterator<Item = f64>, pad: f64) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        return lo - 1.0..hi + 1.0;
    }
    let margin = (hi - lo) * pad;
    lo - margin..hi + margin
}

/// Outcome series of the five regions with the highest latest prevalence.
pub fn create_trend_chart(analysis: &Analysis, output_path: &Path) -> crate::Result<()> {
    let worst = analysis.worst_by_latest(5);
    let years = &analysis.years;
    let y_range = padded_range(
        worst.iter().flat_map(|r| r.record.outcomes().iter().copied()),
        0.1,
    );
    let x_max = years.len().saturating_sub(1) as f64;

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Stunting trend: 5 highest-prevalence regions", ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.2..x_max + 0.2, y_range)?;

    chart
        .configure_mesh()
        .x_labels(years.len())
        .x_label_formatter(&|x| label_at(years, *x))
        .x_desc("Year")
        .y_desc("Prevalence (%)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, region) in worst.iter().enumerate() {
        let color = cluster_color(i);
        let points: Vec<(f64, f64)> = region
            .record
            .outcomes()
            .iter()
            .enumerate()
            .map(|(x, &y)| (x as f64, y))
            .collect();

        chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?
            .label(region.record.name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Bar chart of the largest declines.
pub fn create_decline_chart(analysis: &Analysis, top_n: usize, output_path: &Path) -> crate::Result<()> {
    let top = analysis.top_by_decline(top_n);
    let names: Vec<String> = top.iter().map(|r| r.record.name.clone()).collect();
    let y_range = padded_range(
        top.iter().map(|r| r.metrics.decline).chain(std::iter::once(0.0)),
        0.1,
    );

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Top {} declines in stunting", names.len()), ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(names[..].into_segmented(), y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(names.len())
        .y_desc("Decline (percentage points)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.mix(0.7).filled())
            .margin(8)
            .data(names.iter().zip(&top).map(|(name, r)| (name, r.metrics.decline))),
    )?;

    root.present()?;
    Ok(())
}

/// Poverty against latest prevalence, colored by cluster.
pub fn create_poverty_scatter(analysis: &Analysis, output_path: &Path) -> crate::Result<()> {
    let x_range = padded_range(analysis.regions.iter().map(|r| r.record.indicators.poverty), 0.1);
    let y_range = padded_range(analysis.regions.iter().map(|r| r.record.latest_outcome()), 0.1);

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Poverty vs stunting (colored by cluster)", ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(Feature::Poverty.label())
        .y_desc(Feature::LatestOutcome.label())
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for cluster in 0..analysis.model.k {
        let color = cluster_color(cluster);
        let points: Vec<(f64, f64)> = analysis
            .regions
            .iter()
            .filter(|r| r.cluster == cluster)
            .map(|r| (r.record.indicators.poverty, r.record.latest_outcome()))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 6, color.filled())))?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Distribution of latest prevalence per region group.
pub fn create_group_boxplot(analysis: &Analysis, output_path: &Path) -> crate::Result<()> {
    let names: Vec<String> = analysis.groups.iter().map(|g| g.group.clone()).collect();
    let values = padded_range(
        analysis.groups.iter().flat_map(|g| g.latest_values.iter().copied()),
        0.1,
    );
    let y_range = values.start as f32..values.end as f32;

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Stunting prevalence by region group", ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(names[..].into_segmented(), y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(names.len())
        .y_desc("Prevalence (%)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(analysis.groups.iter().zip(&names).map(|(group, name)| {
        Boxplot::new_vertical(SegmentValue::CenterOf(name), &Quartiles::new(&group.latest_values))
            .width(30)
            .whisker_width(0.5)
            .style(BLUE)
    }))?;

    root.present()?;
    Ok(())
}

/// Annotated pairwise correlation grid.
pub fn create_correlation_heatmap(matrix: &CorrelationMatrix, output_path: &Path) -> crate::Result<()> {
    let n = matrix.features.len() as f64;

    let root = BitMapBackend::new(output_path, (800, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    // Extra room left of and below the grid for the feature names
    let mut chart = ChartBuilder::on(&root)
        .caption("Correlation matrix", ("sans-serif", 26))
        .margin(15)
        .build_cartesian_2d(-1.4..n, -0.6..n)?;

    let size = matrix.features.len();
    let cells: Vec<(f64, f64, Option<f64>)> = (0..size)
        .flat_map(|i| (0..size).map(move |j| (i, j)))
        .map(|(i, j)| (j as f64, n - 1.0 - i as f64, matrix.values[i][j]))
        .collect();

    chart.draw_series(cells.iter().map(|&(col, row, r)| {
        Rectangle::new([(col, row), (col + 1.0, row + 1.0)], coolwarm(r).filled())
    }))?;
    chart.draw_series(cells.iter().map(|&(col, row, r)| {
        let text = r.map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}"));
        Text::new(text, (col + 0.3, row + 0.6), ("sans-serif", 14))
    }))?;

    chart.draw_series(matrix.features.iter().enumerate().map(|(i, feature)| {
        Text::new(feature.short(), (-1.35, n - 1.0 - i as f64 + 0.6), ("sans-serif", 14))
    }))?;
    chart.draw_series(matrix.features.iter().enumerate().map(|(j, feature)| {
        Text::new(feature.short(), (j as f64 + 0.15, -0.2), ("sans-serif", 14))
    }))?;

    root.present()?;
    Ok(())
}

/// Regions in the plane of the first two principal components.
pub fn create_projection_chart(analysis: &Analysis, output_path: &Path) -> crate::Result<()> {
    let Some(projection) = &analysis.projection else {
        anyhow::bail!("no projection available");
    };
    let [pc1, pc2] = projection.explained_variance_ratio;
    let x_range = padded_range(projection.coordinates.values().map(|c| c[0]), 0.15);
    let y_range = padded_range(projection.coordinates.values().map(|c| c[1]), 0.15);

    let root = BitMapBackend::new(output_path, (900, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Clusters on the first two principal components", ("sans-serif", 26))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(format!("PC1 ({:.1}% variance)", pc1 * 100.0))
        .y_desc(format!("PC2 ({:.1}% variance)", pc2 * 100.0))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for cluster in 0..analysis.model.k {
        let color = cluster_color(cluster);
        let points: Vec<(&str, (f64, f64))> = projection
            .coordinates
            .iter()
            .filter(|(name, _)| analysis.model.cluster_of(name) == Some(cluster))
            .map(|(name, c)| (name.as_str(), (c[0], c[1])))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(points.iter().map(|(_, p)| Circle::new(*p, 6, color.filled())))?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
        chart.draw_series(
            points
                .iter()
                .map(|(name, p)| Text::new(name.to_string(), *p, ("sans-serif", 11))),
        )?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Render every chart into `dir`, creating it if needed.
///
/// # Arguments
/// * `analysis` - Finished analysis
/// * `top_n` - Number of bars in the decline chart
/// * `dir` - Output directory
///
/// # Returns
/// * Paths of the written files
pub fn render_all(analysis: &Analysis, top_n: usize, dir: &Path) -> crate::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join(TREND_WORST);
    create_trend_chart(analysis, &path)?;
    written.push(path);

    let path = dir.join(TOP_DECLINES);
    create_decline_chart(analysis, top_n, &path)?;
    written.push(path);

    let path = dir.join(POVERTY_VS_OUTCOME);
    create_poverty_scatter(analysis, &path)?;
    written.push(path);

    let path = dir.join(OUTCOME_BY_GROUP);
    create_group_boxplot(analysis, &path)?;
    written.push(path);

    let path = dir.join(CORRELATION_HEATMAP);
    create_correlation_heatmap(&analysis.correlation_matrix, &path)?;
    written.push(path);

    if analysis.projection.is_some() {
        let path = dir.join(CLUSTER_PROJECTION);
        create_projection_chart(analysis, &path)?;
        written.push(path);
    }

    for path in &written {
        info!(path = %path.display(), "chart saved");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::data::{Indicators, RegionRecord, RegionTable};
    use crate::model::ClusterParams;
    use crate::pipeline::analyze;
    use tempfile::tempdir;

    #[test]
    fn test_label_at() {
        let labels = vec!["2021".to_string(), "2022".to_string()];
        assert_eq!(label_at(&labels, 0.0), "2021");
        assert_eq!(label_at(&labels, 1.0000000001), "2022");
        assert_eq!(label_at(&labels, 0.5), "");
        assert_eq!(label_at(&labels, 2.0), "");
        assert_eq!(label_at(&labels, -1.0), "");
    }

    #[test]
    fn test_coolwarm_endpoints() {
        assert_eq!(coolwarm(Some(-1.0)), RGBColor(59, 76, 192));
        assert_eq!(coolwarm(Some(0.0)), RGBColor(240, 240, 240));
        assert_eq!(coolwarm(Some(1.0)), RGBColor(180, 4, 38));
        assert_eq!(coolwarm(Some(3.0)), coolwarm(Some(1.0)));
        assert_eq!(coolwarm(None), MISSING);
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(vec![0.0, 10.0], 0.1), -1.0..11.0);
        assert_eq!(padded_range(vec![5.0, 5.0], 0.1), 4.0..6.0);
        assert_eq!(padded_range(Vec::new(), 0.1), 0.0..1.0);
    }

    #[test]
    fn test_cluster_color_wraps() {
        assert_eq!(cluster_color(0), cluster_color(CLUSTER_COLORS.len()));
    }

    fn analysis() -> Analysis {
        let region = |name: &str, group: &str, outcomes: [f64; 4], ind: [f64; 5]| {
            RegionRecord::new(
                name,
                group,
                outcomes.to_vec(),
                Indicators {
                    immunization: ind[0],
                    exclusive_feeding: ind[1],
                    clean_water: ind[2],
                    sanitation: ind[3],
                    poverty: ind[4],
                },
            )
            .unwrap()
        };
        let years = ["2021", "2022", "2023", "2024"].map(String::from).to_vec();
        let table = RegionTable::new(
            years,
            vec![
                region("A", "West", [30.0, 28.0, 25.0, 20.0], [60.0, 55.0, 70.0, 65.0, 20.0]),
                region("B", "West", [10.0, 10.5, 10.2, 10.0], [90.0, 80.0, 95.0, 92.0, 5.0]),
                region("C", "East", [5.0, 6.0, 7.0, 8.0], [85.0, 78.0, 90.0, 88.0, 6.0]),
                region("D", "East", [35.0, 34.0, 33.0, 32.0], [55.0, 50.0, 60.0, 55.0, 25.0]),
                region("E", "East", [22.0, 21.0, 19.0, 18.0], [72.0, 66.0, 80.0, 78.0, 10.0]),
            ],
        )
        .unwrap();
        let params = ClusterParams {
            k: 2,
            ..ClusterParams::default()
        };
        analyze(&table, &AnalysisConfig::default(), &params).unwrap()
    }

    #[test]
    #[ignore = "requires system fonts"]
    fn test_render_all() {
        let analysis = analysis();
        let temp_dir = tempdir().unwrap();

        let written = render_all(&analysis, 3, temp_dir.path()).unwrap();
        assert_eq!(written.len(), 6);
        for path in written {
            assert!(path.exists());
        }
    }
}
