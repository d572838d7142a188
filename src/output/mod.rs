//! Persisted form of a tracking run
//!
//! A run is written as one envelope holding every patient history. The JSON
//! form parses back into the same histories, which is what the `timeline`
//! subcommand reads.

use crate::tracking::PatientHistory;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    pub generated_at: DateTime<Utc>,
    pub total_patients: usize,
    pub patients: Vec<PatientHistory>,
}

impl TrackingReport {
    pub fn new(patients: Vec<PatientHistory>) -> Self {
        Self {
            generated_at: Utc::now(),
            total_patients: patients.len(),
            patients,
        }
    }

    pub fn patient(&self, patient_id: &str) -> Option<&PatientHistory> {
        self.patients.iter().find(|p| p.patient_id == patient_id)
    }

    /// Number of patients whose tracking could not run at all
    pub fn failed_patients(&self) -> usize {
        self.patients.iter().filter(|p| p.has_failure()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize tracking results to JSON")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize tracking results to YAML")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse tracking results JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid results file {}", path.display()))
    }

    /// Writes `content` to `path`, creating parent directories
    pub fn write_to(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}
