//! Stuntscope: regional stunting analysis CLI
//!
//! This is the main entrypoint that orchestrates data loading, the analysis
//! pipeline, the enriched CSV, the text report and the charts.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use stuntscope::{analyze, load_regions, render_report, viz, write_enriched, Args};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    run_full_pipeline(&args)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("STUNTSCOPE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the full analysis pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Load data
    let schema = args.column_schema()?;
    let config = args.analysis_config()?;
    let params = args.cluster_params();

    let data_start = Instant::now();
    let table = load_regions(&args.input, &schema)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    info!(
        regions = table.len(),
        elapsed_ms = data_start.elapsed().as_millis() as u64,
        "data loaded"
    );

    // Step 2: Analysis
    let analysis_start = Instant::now();
    let analysis = analyze(&table, &config, &params).context("analysis failed")?;
    info!(
        clusters = analysis.model.k,
        elapsed_ms = analysis_start.elapsed().as_millis() as u64,
        "analysis finished"
    );

    // Step 3: Enriched table and report
    write_enriched(&args.output, &analysis, &schema)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let report = render_report(&analysis, &config).context("failed to format report")?;
    println!("{report}");
    if let Some(path) = &args.report {
        std::fs::write(path, &report)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "report saved");
    }

    // Step 4: Charts; a failure here leaves the other outputs intact
    if !args.no_charts {
        let viz_start = Instant::now();
        match viz::render_all(&analysis, config.top_n, &args.charts_dir) {
            Ok(written) => info!(
                charts = written.len(),
                elapsed_ms = viz_start.elapsed().as_millis() as u64,
                "charts rendered"
            ),
            Err(e) => warn!(error = %e, "chart rendering failed"),
        }
    }

    info!(
        total_ms = start_time.elapsed().as_millis() as u64,
        output = %args.output.display(),
        "pipeline complete"
    );
    Ok(())
}
