//! Patient history model and derived queries

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const FAILURE_PREFIX: &str = "Tracking failed: ";

/// One lesion as seen at one timepoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionObservation {
    pub lesion_id: String,
    pub location: String,
    #[serde(default)]
    pub size_mm: Option<f64>,
    #[serde(default)]
    pub size_cm: Option<f64>,
    #[serde(default)]
    pub characteristics: Option<String>,
    pub observed_at: NaiveDateTime,
    #[serde(default)]
    pub raw_text: Option<String>,
}

/// The processed result of one dated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timepoint {
    pub date: NaiveDateTime,
    pub source_text: String,
    #[serde(default)]
    pub observations: Vec<LesionObservation>,
    /// Oracle failure for this report; absent when extraction succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

impl Timepoint {
    pub fn lesion_ids(&self) -> impl Iterator<Item = &str> {
        self.observations.iter().map(|o| o.lesion_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientHistory {
    pub patient_id: String,
    #[serde(default)]
    pub timepoints: Vec<Timepoint>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl PatientHistory {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            timepoints: Vec::new(),
            summary: None,
        }
    }

    /// A history with no timepoints standing in for a patient whose
    /// tracking could not run
    pub fn failed(patient_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            patient_id: patient_id.into(),
            timepoints: Vec::new(),
            summary: Some(format!("{}{}", FAILURE_PREFIX, reason)),
        }
    }

    /// True when tracking could not run for this patient at all
    pub fn has_failure(&self) -> bool {
        self.summary
            .as_deref()
            .is_some_and(|s| s.starts_with(FAILURE_PREFIX))
    }

    /// Timepoints whose extraction failed after all attempts
    pub fn failed_timepoints(&self) -> usize {
        self.timepoints
            .iter()
            .filter(|tp| tp.extraction_error.is_some())
            .count()
    }

    /// Every observation of one lesion, oldest first
    pub fn lesion_timeline(&self, lesion_id: &str) -> Vec<&LesionObservation> {
        let mut observations: Vec<&LesionObservation> = self
            .timepoints
            .iter()
            .flat_map(|tp| tp.observations.iter())
            .filter(|o| o.lesion_id == lesion_id)
            .collect();
        observations.sort_by_key(|o| o.observed_at);
        observations
    }

    /// Distinct lesion IDs across all timepoints, sorted
    pub fn all_lesion_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .timepoints
            .iter()
            .flat_map(|tp| tp.lesion_ids())
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// First and last timepoint dates, if any
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.timepoints.first()?.date;
        let last = self.timepoints.last()?.date;
        Some((first, last))
    }
}
