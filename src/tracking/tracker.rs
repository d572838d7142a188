//! Per-patient timepoint state machine and the batch driver

use super::model::{LesionObservation, PatientHistory, Timepoint};
use crate::config::TrackerConfig;
use crate::extraction::{ExtractionOutcome, LesionExtractor, PriorLesionSummary, RawLesion};
use crate::llm::LLMClient;
use crate::reports::{sort_chronologically, Report};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

const UNKNOWN_LOCATION: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    #[error("No reports provided for patient {patient_id}")]
    EmptyReports { patient_id: String },

    #[error("Report for patient {found} passed to tracking of patient {expected}")]
    PatientMismatch { expected: String, found: String },
}

/// Where the fold is in a patient's report sequence
enum Stage {
    First,
    FollowUp {
        index: usize,
        prior: Vec<PriorLesionSummary>,
    },
}

/// How lesion identifiers are assigned for one timepoint
#[derive(Clone, Copy)]
enum IdPolicy {
    /// `L1, L2, ...` in oracle order, ignoring anything the oracle proposed
    Sequential,
    /// Oracle-proposed id when usable, else `L{n}`
    OracleOrFallback,
}

#[derive(Clone)]
pub struct LesionTracker {
    extractor: Arc<LesionExtractor>,
    concurrency: usize,
}

impl LesionTracker {
    pub fn new(extractor: LesionExtractor, concurrency: usize) -> Self {
        Self {
            extractor: Arc::new(extractor),
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(client: Arc<dyn LLMClient>, config: &TrackerConfig) -> Self {
        Self::new(LesionExtractor::new(client, config), config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Tracks one patient's reports, oldest first
    ///
    /// Oracle failures never abort the sequence: the affected timepoint is
    /// recorded with no observations and the error message.
    pub async fn track_patient(
        &self,
        patient_id: &str,
        mut reports: Vec<Report>,
    ) -> Result<PatientHistory, TrackingError> {
        if reports.is_empty() {
            return Err(TrackingError::EmptyReports {
                patient_id: patient_id.to_string(),
            });
        }

        if let Some(other) = reports.iter().find(|r| r.patient_id() != patient_id) {
            return Err(TrackingError::PatientMismatch {
                expected: patient_id.to_string(),
                found: other.patient_id().to_string(),
            });
        }

        sort_chronologically(&mut reports);
        info!(patient_id, reports = reports.len(), "Tracking patient");

        let mut history = PatientHistory::new(patient_id);
        let mut stage = Stage::First;

        for report in &reports {
            let (timepoint, index) = match &stage {
                Stage::First => {
                    let outcome = self.extractor.extract_initial(report.text()).await;
                    (build_timepoint(report, outcome, IdPolicy::Sequential), 0)
                }
                Stage::FollowUp { index, prior } => {
                    let outcome = self
                        .extractor
                        .extract_follow_up(report.text(), prior)
                        .await;
                    let timepoint = build_timepoint(report, outcome, IdPolicy::OracleOrFallback);
                    log_new_ids(patient_id, prior, &timepoint);
                    (timepoint, *index)
                }
            };

            if let Some(err) = &timepoint.extraction_error {
                warn!(
                    patient_id,
                    timepoint = index + 1,
                    date = %report.date(),
                    error = %err,
                    "Extraction failed, recording empty timepoint"
                );
            }

            stage = Stage::FollowUp {
                index: index + 1,
                prior: prior_summaries(&timepoint),
            };
            history.timepoints.push(timepoint);
        }

        let failed = history.failed_timepoints();
        if failed > 0 {
            history.summary = Some(format!(
                "Extraction failed for {} of {} timepoints",
                failed,
                history.timepoints.len()
            ));
        }

        info!(
            patient_id,
            timepoints = history.timepoints.len(),
            lesions = history.all_lesion_ids().len(),
            "Patient tracked"
        );
        Ok(history)
    }

    /// Tracks every patient concurrently, one history per input in input order
    ///
    /// Each patient runs in its own task. An input error or a panic in one
    /// task turns into a failed history for that patient only.
    pub async fn track_all<I>(&self, patients: I) -> Vec<PatientHistory>
    where
        I: IntoIterator<Item = (String, Vec<Report>)>,
    {
        let tasks = patients.into_iter().map(|(patient_id, reports)| {
            let tracker = self.clone();
            async move {
                let task_patient = patient_id.clone();
                let handle =
                    tokio::spawn(async move { tracker.track_patient(&task_patient, reports).await });

                match handle.await {
                    Ok(Ok(history)) => history,
                    Ok(Err(e)) => {
                        error!(patient_id = %patient_id, error = %e, "Patient tracking failed");
                        PatientHistory::failed(patient_id, e)
                    }
                    Err(join_error) => {
                        let reason = describe_join_error(join_error);
                        error!(patient_id = %patient_id, error = %reason, "Patient tracking task aborted");
                        PatientHistory::failed(patient_id, reason)
                    }
                }
            }
        });

        stream::iter(tasks)
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

impl std::fmt::Debug for LesionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LesionTracker")
            .field("extractor", &self.extractor)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("panic: {}", message)
}

fn build_timepoint(report: &Report, outcome: ExtractionOutcome, policy: IdPolicy) -> Timepoint {
    let mut observations: Vec<LesionObservation> = Vec::with_capacity(outcome.observations.len());

    for raw in &outcome.observations {
        let lesion_id = match policy {
            IdPolicy::Sequential => None,
            IdPolicy::OracleOrFallback => lesion_id_of(raw),
        }
        .unwrap_or_else(|| format!("L{}", observations.len() + 1));

        observations.push(LesionObservation {
            lesion_id,
            location: location_of(raw),
            size_mm: size_of(raw, "size_mm"),
            size_cm: size_of(raw, "size_cm"),
            characteristics: characteristics_of(raw),
            observed_at: report.date(),
            raw_text: string_of(raw, "raw_text"),
        });
    }

    Timepoint {
        date: report.date(),
        source_text: report.text().to_string(),
        observations,
        extraction_error: if outcome.success { None } else { outcome.error },
    }
}

/// What the next follow-up call is told about this timepoint
pub fn prior_summaries(timepoint: &Timepoint) -> Vec<PriorLesionSummary> {
    timepoint
        .observations
        .iter()
        .map(|o| PriorLesionSummary {
            lesion_id: o.lesion_id.clone(),
            location: o.location.clone(),
            size_cm: o.size_cm.filter(|s| *s != 0.0),
            size_mm: o.size_mm.filter(|s| *s != 0.0),
            characteristics: o.characteristics.clone().filter(|c| !c.is_empty()),
        })
        .collect()
}

fn log_new_ids(patient_id: &str, prior: &[PriorLesionSummary], timepoint: &Timepoint) {
    let known: HashSet<&str> = prior.iter().map(|p| p.lesion_id.as_str()).collect();
    for id in timepoint.lesion_ids().filter(|id| !known.contains(id)) {
        debug!(patient_id, lesion_id = id, "Lesion not seen at previous timepoint");
    }
}

fn lesion_id_of(raw: &RawLesion) -> Option<String> {
    match raw.get("lesion_id")? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn location_of(raw: &RawLesion) -> String {
    string_of(raw, "location").unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

fn string_of(raw: &RawLesion, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn size_of(raw: &RawLesion, key: &str) -> Option<f64> {
    let size = match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    size.is_finite().then_some(size)
}

fn characteristics_of(raw: &RawLesion) -> Option<String> {
    match raw.get("characteristics")? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, MockResponse};
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;
    use std::time::Duration;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn report(patient: &str, date: NaiveDateTime, text: &str) -> Report {
        Report::new(patient, date, text).unwrap()
    }

    fn raw(value: Value) -> RawLesion {
        value.as_object().unwrap().clone()
    }

    fn tracker(mock: Arc<MockLLMClient>, max_retries: u32) -> LesionTracker {
        let config = TrackerConfig {
            max_retries,
            ..TrackerConfig::default()
        };
        let extractor = LesionExtractor::new(mock, &config).with_retry_delay(Duration::ZERO);
        LesionTracker::new(extractor, 2)
    }

    #[tokio::test]
    async fn test_empty_reports_is_error_before_any_call() {
        let mock = Arc::new(MockLLMClient::new());
        let err = tracker(mock.clone(), 1)
            .track_patient("P001", Vec::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TrackingError::EmptyReports {
                patient_id: "P001".to_string()
            }
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_patient_mismatch() {
        let mock = Arc::new(MockLLMClient::new());
        let reports = vec![report("P002", at(2024, 1, 1), "CT chest")];
        let err = tracker(mock.clone(), 1)
            .track_patient("P001", reports)
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::PatientMismatch { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_initial_ids_ignore_oracle_proposals() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::json(json!([
            {"lesion_id": "X9", "location": "liver segment 7", "size_mm": 12},
            {"location": "spleen"}
        ])));

        let history = tracker(mock, 1)
            .track_patient("P001", vec![report("P001", at(2024, 1, 1), "CT abdomen")])
            .await
            .unwrap();

        let ids: Vec<&str> = history.timepoints[0].lesion_ids().collect();
        assert_eq!(ids, vec!["L1", "L2"]);
    }

    #[tokio::test]
    async fn test_follow_up_uses_oracle_ids_with_fallback() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses(vec![
            MockResponse::json(json!([{"location": "right upper lobe", "size_cm": 2.3}])),
            MockResponse::json(json!([
                {"lesion_id": "L1", "location": "right upper lobe", "size_cm": 2.8},
                {"location": "left lower lobe", "size_cm": 0.6},
                {"lesion_id": 7, "location": "liver"}
            ])),
        ]);

        let reports = vec![
            report("P001", at(2024, 4, 1), "Follow-up CT"),
            report("P001", at(2024, 1, 1), "Baseline CT"),
        ];
        let history = tracker(mock.clone(), 1)
            .track_patient("P001", reports)
            .await
            .unwrap();

        assert_eq!(history.timepoints[0].date, at(2024, 1, 1));
        let ids: Vec<&str> = history.timepoints[1].lesion_ids().collect();
        assert_eq!(ids, vec!["L1", "L2", "7"]);

        let follow_up = mock.requests()[1].user_content().unwrap().to_string();
        assert!(follow_up.contains("\"lesion_id\": \"L1\""));
        assert!(follow_up.contains("Follow-up CT"));
    }

    #[tokio::test]
    async fn test_failed_timepoint_is_recorded_and_tracking_continues() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_responses(vec![
            MockResponse::text("not json"),
            MockResponse::json(json!([{"lesion_id": "L4", "location": "liver"}])),
        ]);

        let reports = vec![
            report("P001", at(2024, 1, 1), "Baseline"),
            report("P001", at(2024, 2, 1), "Follow-up"),
        ];
        let history = tracker(mock.clone(), 1)
            .track_patient("P001", reports)
            .await
            .unwrap();

        assert_eq!(history.timepoints.len(), 2);
        assert!(history.timepoints[0].observations.is_empty());
        assert!(history.timepoints[0].extraction_error.is_some());
        assert!(history.timepoints[1].extraction_error.is_none());
        assert_eq!(history.timepoints[1].observations[0].lesion_id, "L4");
        assert_eq!(
            history.summary.as_deref(),
            Some("Extraction failed for 1 of 2 timepoints")
        );
        assert!(!history.has_failure());
        assert!(mock.requests()[1].user_content().unwrap().contains("[]"));
    }

    #[test]
    fn test_field_defaulting() {
        let lesion = raw(json!({
            "location": 42,
            "size_mm": "15.5",
            "size_cm": "n/a",
            "characteristics": ["enhancing", "", "nodular", 3],
            "raw_text": "15.5 mm enhancing nodule"
        }));

        assert_eq!(location_of(&lesion), "Unknown");
        assert_eq!(size_of(&lesion, "size_mm"), Some(15.5));
        assert_eq!(size_of(&lesion, "size_cm"), None);
        assert_eq!(
            characteristics_of(&lesion).as_deref(),
            Some("enhancing, nodular")
        );
        assert_eq!(
            string_of(&lesion, "raw_text").as_deref(),
            Some("15.5 mm enhancing nodule")
        );
    }

    #[test]
    fn test_lesion_id_forms() {
        assert_eq!(lesion_id_of(&raw(json!({"lesion_id": "L3"}))).as_deref(), Some("L3"));
        assert_eq!(lesion_id_of(&raw(json!({"lesion_id": 5}))).as_deref(), Some("5"));
        assert_eq!(lesion_id_of(&raw(json!({"lesion_id": "  "}))), None);
        assert_eq!(lesion_id_of(&raw(json!({"lesion_id": null}))), None);
        assert_eq!(lesion_id_of(&raw(json!({}))), None);
    }

    #[test]
    fn test_prior_summaries_drop_empty_fields() {
        let when = at(2024, 1, 1);
        let timepoint = Timepoint {
            date: when,
            source_text: "CT".to_string(),
            observations: vec![LesionObservation {
                lesion_id: "L1".to_string(),
                location: "liver".to_string(),
                size_mm: Some(0.0),
                size_cm: Some(1.4),
                characteristics: Some(String::new()),
                observed_at: when,
                raw_text: Some("1.4 cm liver lesion".to_string()),
            }],
            extraction_error: None,
        };

        let summaries = prior_summaries(&timepoint);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].size_cm, Some(1.4));
        assert_eq!(summaries[0].size_mm, None);
        assert_eq!(summaries[0].characteristics, None);
    }

    #[test]
    fn test_prior_summaries_keep_nonzero_sizes() {
        let when = at(2024, 1, 1);
        let timepoint = Timepoint {
            date: when,
            source_text: "CT".to_string(),
            observations: vec![LesionObservation {
                lesion_id: "L1".to_string(),
                location: "liver".to_string(),
                size_mm: Some(-3.0),
                size_cm: Some(0.0),
                characteristics: None,
                observed_at: when,
                raw_text: None,
            }],
            extraction_error: None,
        };

        let summaries = prior_summaries(&timepoint);
        assert_eq!(summaries[0].size_mm, Some(-3.0));
        assert_eq!(summaries[0].size_cm, None);
    }

    #[tokio::test]
    async fn test_track_all_keeps_input_order_and_degrades_errors() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("[]"));

        let patients = vec![
            ("P002".to_string(), Vec::new()),
            (
                "P001".to_string(),
                vec![report("P001", at(2024, 1, 1), "CT chest")],
            ),
        ];
        let histories = tracker(mock, 1).track_all(patients).await;

        assert_eq!(histories.len(), 2);
        assert_eq!(histories[0].patient_id, "P002");
        assert!(histories[0].has_failure());
        assert!(histories[0].timepoints.is_empty());
        assert_eq!(histories[1].patient_id, "P001");
        assert!(!histories[1].has_failure());
        assert_eq!(histories[1].timepoints.len(), 1);
    }
}
