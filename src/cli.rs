//! Command-line interface definitions and argument parsing

use crate::config::{AnalysisConfig, ColumnSchema};
use crate::model::ClusterParams;
use clap::Parser;
use std::path::PathBuf;

/// Regional stunting analysis: trends, clusters, correlations and patterns
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data_stunting.csv")]
    pub input: PathBuf,

    /// Output path for the enriched CSV
    #[arg(short, long, default_value = "hasil_analisis_stunting.csv")]
    pub output: PathBuf,

    /// Also write the text report to this file
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Directory for the PNG charts
    #[arg(long, default_value = "charts")]
    pub charts_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means restarts; the lowest inertia wins
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Length of the ranked lists in the report
    #[arg(long, default_value = "10")]
    pub top_n: usize,

    /// National prevalence target (%) the forecast is compared against
    #[arg(long, default_value = "18.8")]
    pub target: f64,

    /// JSON file overriding the input column names
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            k: self.clusters,
            seed: self.seed,
            n_runs: self.n_runs,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
        }
    }

    /// Default policy constants with the command-line overrides applied.
    pub fn analysis_config(&self) -> crate::Result<AnalysisConfig> {
        if self.top_n == 0 {
            anyhow::bail!("--top-n must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.target) {
            anyhow::bail!("--target must be a percentage, got {}", self.target);
        }
        Ok(AnalysisConfig {
            top_n: self.top_n,
            policy_target: self.target,
            ..AnalysisConfig::default()
        })
    }

    pub fn column_schema(&self) -> crate::Result<ColumnSchema> {
        match &self.schema {
            Some(path) => Ok(ColumnSchema::from_json_file(path)?),
            None => Ok(ColumnSchema::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["stuntscope"]);
        assert_eq!(args.input, PathBuf::from("data_stunting.csv"));
        assert_eq!(args.clusters, 4);
        assert_eq!(args.seed, 42);
        assert!(!args.no_charts);
        assert!(args.report.is_none());

        let params = args.cluster_params();
        assert_eq!(params.k, 4);
        assert_eq!(params.n_runs, 10);
        assert_eq!(params.max_iters, 300);

        let config = args.analysis_config().unwrap();
        assert_eq!(config.top_n, 10);
        assert_eq!(config.policy_target, 18.8);
        assert_eq!(args.column_schema().unwrap(), ColumnSchema::default());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "stuntscope",
            "-k",
            "3",
            "--seed",
            "7",
            "--top-n",
            "5",
            "--target",
            "14",
            "--no-charts",
            "--report",
            "out.txt",
        ]);
        assert_eq!(args.cluster_params().k, 3);
        assert_eq!(args.cluster_params().seed, 7);
        assert!(args.no_charts);
        assert_eq!(args.report, Some(PathBuf::from("out.txt")));

        let config = args.analysis_config().unwrap();
        assert_eq!(config.top_n, 5);
        assert_eq!(config.policy_target, 14.0);
    }

    #[test]
    fn test_invalid_overrides() {
        let args = Args::parse_from(["stuntscope", "--top-n", "0"]);
        assert!(args.analysis_config().is_err());

        let args = Args::parse_from(["stuntscope", "--target", "120"]);
        assert!(args.analysis_config().is_err());
    }
}
