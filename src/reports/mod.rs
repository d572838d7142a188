//! Validated radiology reports and per-patient chronological grouping

mod loader;

pub use loader::{parse_report_date, LoadError, ReportLoader};

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("Patient ID cannot be empty")]
    EmptyPatientId,

    #[error("Report text cannot be empty")]
    EmptyText,
}

/// One dated report for one patient
///
/// Construction trims `patient_id` and `text` and rejects blank values, so a
/// `Report` in hand always satisfies both invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    patient_id: String,
    date: NaiveDateTime,
    text: String,
}

impl Report {
    pub fn new(
        patient_id: impl AsRef<str>,
        date: NaiveDateTime,
        text: impl AsRef<str>,
    ) -> Result<Self, ReportError> {
        let patient_id = patient_id.as_ref().trim();
        if patient_id.is_empty() {
            return Err(ReportError::EmptyPatientId);
        }

        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(ReportError::EmptyText);
        }

        Ok(Self {
            patient_id: patient_id.to_string(),
            date,
            text: text.to_string(),
        })
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Sorts reports by date, keeping input order for equal dates
pub fn sort_chronologically(reports: &mut [Report]) {
    reports.sort_by_key(|r| r.date);
}

/// Holds validated reports and hands out per-patient timelines
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    reports: Vec<Report>,
}

impl ReportStore {
    pub fn new(reports: Vec<Report>) -> Self {
        Self { reports }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Distinct patient IDs, sorted
    pub fn patient_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.reports.iter().map(|r| r.patient_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Chronologically ordered reports for one patient (empty if unknown)
    pub fn timeline(&self, patient_id: &str) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        sort_chronologically(&mut reports);
        reports
    }

    /// Every patient mapped to their chronologically ordered reports
    pub fn patient_timelines(&self) -> BTreeMap<String, Vec<Report>> {
        let mut timelines: BTreeMap<String, Vec<Report>> = BTreeMap::new();

        for report in &self.reports {
            timelines
                .entry(report.patient_id.clone())
                .or_default()
                .push(report.clone());
        }

        for reports in timelines.values_mut() {
            sort_chronologically(reports);
        }

        timelines
    }
}
