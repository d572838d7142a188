//! Loading reports from CSV and JSON files
//!
//! Both formats go through the same row validation: rows missing a required
//! value are dropped with a warning, rows with an unparseable date or blank
//! text are collected as errors, and any error fails the whole load.

use super::{Report, ReportStore};
use crate::config::TrackerConfig;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const MAX_REPORTED_ERRORS: usize = 10;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported input format '{0}' (expected .csv or .json)")]
    UnsupportedFormat(String),

    #[error("Missing required columns: {missing:?}. Available columns: {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Data validation failed:\n{0}")]
    Validation(String),

    #[error("No valid reports found in the dataset")]
    NoReports,
}

/// Parses the date formats commonly found in report exports
pub fn parse_report_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    // Offset timestamps are normalized to UTC so they order by instant
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// A row before validation; `None` means the cell was absent or empty
#[derive(Debug, Default)]
struct RawRow {
    patient_id: Option<String>,
    date: Option<String>,
    text: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Loads reports using the column names from the tracker configuration
#[derive(Debug, Clone)]
pub struct ReportLoader {
    patient_id_column: String,
    date_column: String,
    report_column: String,
}

impl Default for ReportLoader {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl ReportLoader {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            patient_id_column: config.patient_id_column.clone(),
            date_column: config.date_column.clone(),
            report_column: config.report_column.clone(),
        }
    }

    /// Loads a `.csv` or `.json` file into a [`ReportStore`]
    pub fn load_path(&self, path: &Path) -> Result<ReportStore, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loading reports from {}", path.display());

        let reports = match extension.as_str() {
            "csv" => self.load_csv(file)?,
            "json" => {
                let value: Value = serde_json::from_reader(std::io::BufReader::new(file))?;
                self.load_json(value)?
            }
            other => return Err(LoadError::UnsupportedFormat(other.to_string())),
        };

        Ok(ReportStore::new(reports))
    }

    pub fn load_csv<R: Read>(&self, reader: R) -> Result<Vec<Report>, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
        let [patient_idx, date_idx, report_idx] = self.column_indices(&headers)?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(RawRow {
                patient_id: record.get(patient_idx).and_then(non_empty),
                date: record.get(date_idx).and_then(non_empty),
                text: record.get(report_idx).and_then(non_empty),
            });
        }

        self.build_reports(rows)
    }

    /// Loads from a JSON array of objects keyed by the configured columns
    pub fn load_json(&self, value: Value) -> Result<Vec<Report>, LoadError> {
        let Value::Array(items) = value else {
            return Err(LoadError::Validation(
                "expected a JSON array of report objects".to_string(),
            ));
        };

        let mut available: Vec<String> = items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|obj| obj.keys().cloned())
            .collect();
        available.sort();
        available.dedup();
        self.check_columns(&available)?;

        let cell = |obj: &serde_json::Map<String, Value>, key: &str| match obj.get(key) {
            Some(Value::String(s)) => non_empty(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let rows = items
            .iter()
            .map(|item| match item.as_object() {
                Some(obj) => RawRow {
                    patient_id: cell(obj, &self.patient_id_column),
                    date: cell(obj, &self.date_column),
                    text: cell(obj, &self.report_column),
                },
                None => RawRow::default(),
            })
            .collect();

        self.build_reports(rows)
    }

    fn column_indices(&self, headers: &[String]) -> Result<[usize; 3], LoadError> {
        self.check_columns(headers)?;
        let index_of = |name: &String| headers.iter().position(|h| h == name).unwrap_or_default();
        Ok([
            index_of(&self.patient_id_column),
            index_of(&self.date_column),
            index_of(&self.report_column),
        ])
    }

    fn check_columns(&self, available: &[String]) -> Result<(), LoadError> {
        let missing: Vec<String> = [
            &self.patient_id_column,
            &self.date_column,
            &self.report_column,
        ]
        .into_iter()
        .filter(|required| !available.iter().any(|a| a == *required))
        .cloned()
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingColumns {
                missing,
                available: available.to_vec(),
            })
        }
    }

    fn build_reports(&self, rows: Vec<RawRow>) -> Result<Vec<Report>, LoadError> {
        let total = rows.len();
        let mut reports = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut dropped = 0usize;

        for (idx, row) in rows.into_iter().enumerate() {
            let (Some(patient_id), Some(date), Some(text)) = (row.patient_id, row.date, row.text)
            else {
                dropped += 1;
                continue;
            };

            let Some(date) = parse_report_date(&date) else {
                errors.push(format!("Row {}: unparseable date '{}'", idx, date));
                continue;
            };

            match Report::new(&patient_id, date, &text) {
                Ok(report) => reports.push(report),
                Err(e) => errors.push(format!("Row {}: {}", idx, e)),
            }
        }

        if dropped > 0 {
            warn!("Dropped {} rows with missing required data", dropped);
        }

        if !errors.is_empty() {
            let mut summary = errors
                .iter()
                .take(MAX_REPORTED_ERRORS)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            if errors.len() > MAX_REPORTED_ERRORS {
                summary.push_str(&format!(
                    "\n... and {} more errors",
                    errors.len() - MAX_REPORTED_ERRORS
                ));
            }
            return Err(LoadError::Validation(summary));
        }

        if reports.is_empty() {
            return Err(LoadError::NoReports);
        }

        reports.sort_by(|a, b| {
            a.patient_id()
                .cmp(b.patient_id())
                .then(a.date().cmp(&b.date()))
        });

        debug!("Loaded {} of {} rows as reports", reports.len(), total);
        Ok(reports)
    }
}
