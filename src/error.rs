//! Error types for loading and analysis stages

/// Failures while reading the region table or writing the enriched snapshot.
/// All of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("missing column `{column}`")]
    MissingColumn { column: String },

    #[error("column `{column}` has the wrong type: expected {expected}")]
    WrongType { column: String, expected: &'static str },

    #[error("missing or non-numeric value in column `{column}` for region `{region}`")]
    MissingValue { region: String, column: String },

    #[error("region `{region}` appears more than once")]
    DuplicateRegion { region: String },

    #[error("region `{region}`: `{column}` = {value} is outside [0, 100]")]
    PercentOutOfBounds {
        region: String,
        column: String,
        value: f64,
    },

    #[error("invalid column schema: {0}")]
    Schema(String),

    #[error("input contains no regions")]
    Empty,
}

/// Failures raised by the analysis stages.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("region `{region}`: percentage decline undefined (first-year value is 0)")]
    DivisionUndefined { region: String },

    #[error("column `{column}` has zero standard deviation")]
    DegenerateColumn { column: String },

    #[error("column `{column}` is constant; correlation undefined")]
    InsufficientVariance { column: String },

    #[error("region `{region}`: `{column}` = {value} falls outside every declared bucket")]
    OutOfRange {
        region: String,
        column: String,
        value: f64,
    },

    #[error("priority weights sum to {sum}, expected 1.0")]
    WeightsNotNormalized { sum: f64 },

    #[error("invalid buckets for `{column}`: {reason}")]
    InvalidBuckets { column: String, reason: String },

    #[error("cannot form {k} clusters from {rows} regions")]
    InvalidClusterCount { k: usize, rows: usize },

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("no regions to analyze")]
    Empty,
}
