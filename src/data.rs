//! Region table loading and enriched snapshot writing using Polars

use crate::config::{ColumnSchema, Feature};
use crate::error::LoadError;
use crate::pipeline::{Analysis, EnrichedRegion};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Percentage indicators for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicators {
    pub immunization: f64,
    pub exclusive_feeding: f64,
    pub clean_water: f64,
    pub sanitation: f64,
    pub poverty: f64,
}

/// One row of the input table.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub name: String,
    pub group: String,
    /// Chronological outcome series, at least two values
    outcomes: Vec<f64>,
    pub indicators: Indicators,
}

impl RegionRecord {
    /// Build a record, rejecting short outcome series and percentages outside [0, 100].
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        outcomes: Vec<f64>,
        indicators: Indicators,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        if outcomes.len() < 2 {
            return Err(LoadError::Schema(format!(
                "region `{name}` has {} outcome values, need at least 2",
                outcomes.len()
            )));
        }

        let record = Self {
            name,
            group: group.into(),
            outcomes,
            indicators,
        };
        record.check_bounds()?;
        Ok(record)
    }

    fn check_bounds(&self) -> Result<(), LoadError> {
        let outcomes = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(i, &v)| (format!("outcome[{i}]"), v));
        let indicators = Feature::INDICATORS
            .iter()
            .map(|&f| (f.label().to_string(), self.value(f)));

        for (column, value) in outcomes.chain(indicators) {
            if !(0.0..=100.0).contains(&value) {
                return Err(LoadError::PercentOutOfBounds {
                    region: self.name.clone(),
                    column,
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn outcomes(&self) -> &[f64] {
        &self.outcomes
    }

    pub fn first_outcome(&self) -> f64 {
        self.outcomes[0]
    }

    pub fn latest_outcome(&self) -> f64 {
        self.outcomes[self.outcomes.len() - 1]
    }

    /// Number of year-to-year intervals in the outcome series.
    pub fn intervals(&self) -> usize {
        self.outcomes.len() - 1
    }

    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::LatestOutcome => self.latest_outcome(),
            Feature::Immunization => self.indicators.immunization,
            Feature::ExclusiveFeeding => self.indicators.exclusive_feeding,
            Feature::CleanWater => self.indicators.clean_water,
            Feature::Sanitation => self.indicators.sanitation,
            Feature::Poverty => self.indicators.poverty,
        }
    }
}

/// Immutable set of regions with unique names and a shared outcome length.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTable {
    years: Vec<String>,
    records: Vec<RegionRecord>,
}

impl RegionTable {
    pub fn new(years: Vec<String>, records: Vec<RegionRecord>) -> Result<Self, LoadError> {
        if records.is_empty() {
            return Err(LoadError::Empty);
        }

        let mut seen = HashSet::new();
        for record in &records {
            if record.outcomes().len() != years.len() {
                return Err(LoadError::Schema(format!(
                    "region `{}` has {} outcome values for {} years",
                    record.name,
                    record.outcomes().len(),
                    years.len()
                )));
            }
            if !seen.insert(record.name.as_str()) {
                return Err(LoadError::DuplicateRegion {
                    region: record.name.clone(),
                });
            }
        }

        Ok(Self { years, records })
    }

    pub fn years(&self) -> &[String] {
        &self.years
    }

    pub fn records(&self) -> &[RegionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RegionRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}

/// Load the region table from a CSV file.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
/// * `schema` - Column names to read
///
/// # Returns
/// * `RegionTable` with validated, unique, in-range rows
pub fn load_regions(file_path: impl AsRef<Path>, schema: &ColumnSchema) -> Result<RegionTable, LoadError> {
    let path = file_path.as_ref();
    schema.validate()?;
    if !path.is_file() {
        return Err(LoadError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()?
        .collect()?;
    debug!(rows = df.height(), columns = df.width(), "csv parsed");

    if df.height() == 0 {
        return Err(LoadError::Empty);
    }

    let names = string_column(&df, &schema.name, None)?;
    let groups = string_column(&df, &schema.group, Some(names.as_slice()))?;

    let outcome_columns = schema
        .outcomes
        .iter()
        .map(|column| numeric_column(&df, column, &names))
        .collect::<Result<Vec<_>, _>>()?;
    let immunization = numeric_column(&df, &schema.immunization, &names)?;
    let exclusive_feeding = numeric_column(&df, &schema.exclusive_feeding, &names)?;
    let clean_water = numeric_column(&df, &schema.clean_water, &names)?;
    let sanitation = numeric_column(&df, &schema.sanitation, &names)?;
    let poverty = numeric_column(&df, &schema.poverty, &names)?;

    let mut records = Vec::with_capacity(names.len());
    for (row, (name, group)) in names.iter().zip(groups).enumerate() {
        let outcomes = outcome_columns.iter().map(|column| column[row]).collect();
        let indicators = Indicators {
            immunization: immunization[row],
            exclusive_feeding: exclusive_feeding[row],
            clean_water: clean_water[row],
            sanitation: sanitation[row],
            poverty: poverty[row],
        };
        let record = RegionRecord::new(name.clone(), group, outcomes, indicators)
            .map_err(|e| name_bounds_column(e, schema))?;
        records.push(record);
    }

    let table = RegionTable::new(schema.years.clone(), records)?;
    info!(regions = table.len(), path = %path.display(), "region table loaded");
    Ok(table)
}

/// Replace the internal column label of a bounds error with the file's column name.
fn name_bounds_column(error: LoadError, schema: &ColumnSchema) -> LoadError {
    match error {
        LoadError::PercentOutOfBounds {
            region,
            column,
            value,
        } => {
            let column = Feature::INDICATORS
                .iter()
                .find(|f| f.label() == column)
                .map(|&f| schema.column(f).to_string())
                .or_else(|| {
                    column
                        .strip_prefix("outcome[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .and_then(|i| i.parse::<usize>().ok())
                        .and_then(|i| schema.outcomes.get(i).cloned())
                })
                .unwrap_or(column);
            LoadError::PercentOutOfBounds {
                region,
                column,
                value,
            }
        }
        other => other,
    }
}

fn string_column(
    df: &DataFrame,
    column: &str,
    names: Option<&[String]>,
) -> Result<Vec<String>, LoadError> {
    let series = df.column(column).map_err(|_| LoadError::MissingColumn {
        column: column.to_string(),
    })?;
    // Labels such as zone numbers are inferred as integers; read them as text
    let cast = series
        .cast(&DataType::String)
        .map_err(|_| LoadError::WrongType {
            column: column.to_string(),
            expected: "text",
        })?;
    let values = cast.str()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.map(|v| v.trim().to_string()).ok_or_else(|| LoadError::MissingValue {
                region: row_identity(names, row),
                column: column.to_string(),
            })
        })
        .collect()
}

fn numeric_column(df: &DataFrame, column: &str, names: &[String]) -> Result<Vec<f64>, LoadError> {
    let series = df.column(column).map_err(|_| LoadError::MissingColumn {
        column: column.to_string(),
    })?;
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|_| LoadError::WrongType {
            column: column.to_string(),
            expected: "number",
        })?;
    let values = cast.f64()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| LoadError::MissingValue {
                region: row_identity(Some(names), row),
                column: column.to_string(),
            })
        })
        .collect()
}

fn row_identity(names: Option<&[String]>, row: usize) -> String {
    names
        .and_then(|n| n.get(row).cloned())
        .unwrap_or_else(|| format!("row {}", row + 1))
}

/// Write the enriched snapshot: input columns in schema order followed by the
/// derived columns. Undefined values are written as empty cells.
pub fn write_enriched(
    file_path: impl AsRef<Path>,
    analysis: &Analysis,
    schema: &ColumnSchema,
) -> Result<(), LoadError> {
    let path = file_path.as_ref();
    let regions = analysis.regions.as_slice();

    let mut columns = vec![
        text_series(&schema.name, regions, |r| Some(r.record.name.clone())),
        text_series(&schema.group, regions, |r| Some(r.record.group.clone())),
    ];
    for (i, column) in schema.outcomes.iter().enumerate() {
        columns.push(float_series(column, regions, |r| Some(r.record.outcomes()[i])));
    }
    for feature in Feature::INDICATORS {
        columns.push(float_series(schema.column(feature), regions, |r| {
            Some(r.record.value(feature))
        }));
    }

    columns.push(float_series("Decline", regions, |r| Some(r.metrics.decline)));
    columns.push(float_series("Pct_Decline", regions, |r| r.metrics.pct_decline));
    columns.push(float_series("Annual_Trend", regions, |r| Some(r.metrics.annual_trend)));
    columns.push(float_series("Forecast_Next", regions, |r| Some(r.metrics.forecast_next)));
    columns.push(float_series("Priority_Score", regions, |r| Some(r.metrics.priority_score)));
    columns.push(Series::new(
        "Cluster",
        regions.iter().map(|r| r.cluster as u32).collect::<Vec<u32>>(),
    ));
    for (name, feature) in [
        ("Outcome_Category", Feature::LatestOutcome),
        ("Immunization_Category", Feature::Immunization),
        ("Poverty_Category", Feature::Poverty),
        ("Sanitation_Category", Feature::Sanitation),
    ] {
        columns.push(text_series(name, regions, |r| {
            r.categories.get(&feature).map(|level| level.to_string())
        }));
    }

    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(path).map_err(|source| LoadError::Write {
        path: path.display().to_string(),
        source,
    })?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;

    info!(rows = df.height(), path = %path.display(), "enriched table written");
    Ok(())
}

fn text_series(
    name: &str,
    regions: &[EnrichedRegion],
    value: impl Fn(&EnrichedRegion) -> Option<String>,
) -> Series {
    Series::new(name, regions.iter().map(value).collect::<Vec<Option<String>>>())
}

fn float_series(
    name: &str,
    regions: &[EnrichedRegion],
    value: impl Fn(&EnrichedRegion) -> Option<f64>,
) -> Series {
    Series::new(name, regions.iter().map(value).collect::<Vec<Option<f64>>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Provinsi,Region,Prevalensi_2021,Prevalensi_2022,Prevalensi_2023,Prevalensi_2024,Cakupan_Imunisasi,Cakupan_ASI_Eksklusif,Akses_Air_Bersih,Akses_Sanitasi,Tingkat_Kemiskinan";

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_regions() {
        let file = create_test_csv(&[
            "Aceh,Sumatera,33.2,31.2,29.4,28.6,62.5,60.1,85.3,72.4,14.2",
            "Bali,Bali-Nusa,10.9,8.0,7.2,7.1,88,80.5,95.1,93.7,4.0",
        ]);

        let table = load_regions(file.path(), &ColumnSchema::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.years().len(), 4);

        let bali = table.get("Bali").unwrap();
        assert_eq!(bali.group, "Bali-Nusa");
        assert_eq!(bali.outcomes(), &[10.9, 8.0, 7.2, 7.1]);
        assert_eq!(bali.indicators.immunization, 88.0);
        assert_eq!(bali.value(Feature::LatestOutcome), 7.1);
    }

    #[test]
    fn test_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Provinsi,Region,Prevalensi_2021").unwrap();
        writeln!(file, "Aceh,Sumatera,33.2").unwrap();

        let result = load_regions(file.path(), &ColumnSchema::default());
        assert!(matches!(result, Err(LoadError::MissingColumn { .. })));
    }

    #[test]
    fn test_header_only_is_empty() {
        let file = create_test_csv(&[]);

        let result = load_regions(file.path(), &ColumnSchema::default());
        assert!(matches!(result, Err(LoadError::Empty)));
    }

    #[test]
    fn test_numeric_group_labels() {
        let file = create_test_csv(&[
            "Aceh,1,33.2,31.2,29.4,28.6,62.5,60.1,85.3,72.4,14.2",
            "Bali,2,10.9,8.0,7.2,7.1,88,80.5,95.1,93.7,4.0",
        ]);

        let table = load_regions(file.path(), &ColumnSchema::default()).unwrap();
        assert_eq!(table.get("Aceh").unwrap().group, "1");
        assert_eq!(table.get("Bali").unwrap().group, "2");
    }

    #[test]
    fn test_numeric_region_names() {
        let file = create_test_csv(&[
            "11,Sumatera,33.2,31.2,29.4,28.6,62.5,60.1,85.3,72.4,14.2",
            "51,Bali-Nusa,10.9,8.0,7.2,7.1,88,80.5,95.1,93.7,4.0",
        ]);

        let table = load_regions(file.path(), &ColumnSchema::default()).unwrap();
        assert_eq!(table.get("51").unwrap().group, "Bali-Nusa");
    }

    #[test]
    fn test_non_numeric_value_names_region() {
        let file = create_test_csv(&[
            "Aceh,Sumatera,33.2,31.2,29.4,28.6,62.5,60.1,85.3,72.4,14.2",
            "Bali,Bali-Nusa,10.9,8.0,7.2,7.1,n/a,80.5,95.1,93.7,4.0",
        ]);

        let result = load_regions(file.path(), &ColumnSchema::default());
        match result {
            Err(LoadError::MissingValue { region, column }) => {
                assert_eq!(region, "Bali");
                assert_eq!(column, "Cakupan_Imunisasi");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_percentage_out_of_bounds_is_rejected() {
        let file = create_test_csv(&["Aceh,Sumatera,33.2,31.2,29.4,28.6,62.5,60.1,85.3,172.4,14.2"]);

        let result = load_regions(file.path(), &ColumnSchema::default());
        match result {
            Err(LoadError::PercentOutOfBounds { region, column, value }) => {
                assert_eq!(region, "Aceh");
                assert_eq!(column, "Akses_Sanitasi");
                assert_eq!(value, 172.4);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_region_is_rejected() {
        let file = create_test_csv(&[
            "Aceh,Sumatera,33.2,31.2,29.4,28.6,62.5,60.1,85.3,72.4,14.2",
            "Aceh,Sumatera,30.0,29.0,28.0,27.0,62.5,60.1,85.3,72.4,14.2",
        ]);

        let result = load_regions(file.path(), &ColumnSchema::default());
        assert!(matches!(result, Err(LoadError::DuplicateRegion { region }) if region == "Aceh"));
    }

    #[test]
    fn test_missing_file() {
        let result = load_regions("/nonexistent/regions.csv", &ColumnSchema::default());
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_record_requires_two_years() {
        let indicators = Indicators {
            immunization: 50.0,
            exclusive_feeding: 50.0,
            clean_water: 50.0,
            sanitation: 50.0,
            poverty: 10.0,
        };
        assert!(RegionRecord::new("X", "G", vec![20.0], indicators).is_err());
        assert!(RegionRecord::new("X", "G", vec![20.0, -1.0], indicators).is_err());
        let record = RegionRecord::new("X", "G", vec![20.0, 18.0, 15.0], indicators).unwrap();
        assert_eq!(record.intervals(), 2);
        assert_eq!(record.first_outcome(), 20.0);
        assert_eq!(record.latest_outcome(), 15.0);
    }
}
