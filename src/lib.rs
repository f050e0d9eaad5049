//! Stuntscope: analysis of regional stunting indicators
//!
//! Derives trend metrics and a priority score per region, clusters regions on
//! standardized indicators, ranks risk factors by correlation with prevalence,
//! and buckets indicators into categories to surface simple patterns.

pub mod cli;
pub mod config;
pub mod correlation;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pattern;
pub mod pipeline;
pub mod report;
pub mod scaler;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{AnalysisConfig, ColumnSchema, Feature};
pub use data::{load_regions, write_enriched, RegionRecord, RegionTable};
pub use error::{AnalysisError, LoadError};
pub use model::{fit_kmeans, ClusterModel, ClusterParams};
pub use pipeline::{analyze, Analysis};
pub use report::render_report;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
