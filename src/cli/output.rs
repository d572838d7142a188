//! Rendering of tracking results, lesion timelines and health probes

use anyhow::{Context, Result};
use serde::Serialize;

use crate::llm::OllamaHealth;
use crate::output::TrackingReport;
use crate::tracking::{LesionObservation, PatientHistory};

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

/// One lesion's observations for the `timeline` subcommand
#[derive(Debug, Clone, Serialize)]
pub struct LesionTimelineView<'a> {
    pub patient_id: &'a str,
    pub lesion_id: &'a str,
    pub observations: Vec<&'a LesionObservation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub host: String,
    pub model: String,
    pub reachable: bool,
    pub model_installed: bool,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthView {
    pub fn from_probe(host: &str, model: &str, probe: Result<OllamaHealth, String>) -> Self {
        match probe {
            Ok(health) => Self {
                host: health.host.clone(),
                model: model.to_string(),
                reachable: true,
                model_installed: health.has_model(model),
                models: health.models,
                error: None,
            },
            Err(error) => Self {
                host: host.to_string(),
                model: model.to_string(),
                reachable: false,
                model_installed: false,
                models: Vec::new(),
                error: Some(error),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.reachable && self.model_installed
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &TrackingReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => report.to_json(),
            OutputFormat::Yaml => report.to_yaml(),
            OutputFormat::Human => Ok(format_summary(report)),
        }
    }

    pub fn format_timeline(&self, history: &PatientHistory, lesion_id: Option<&str>) -> Result<String> {
        let lesion_ids: Vec<String> = match lesion_id {
            Some(id) => vec![id.to_string()],
            None => history.all_lesion_ids(),
        };

        let views: Vec<LesionTimelineView> = lesion_ids
            .iter()
            .map(|id| LesionTimelineView {
                patient_id: &history.patient_id,
                lesion_id: id,
                observations: history.lesion_timeline(id),
            })
            .collect();

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&views).context("Failed to serialize timeline to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(&views).context("Failed to serialize timeline to YAML")
            }
            OutputFormat::Human => Ok(format_timeline_human(history, &views)),
        }
    }

    pub fn format_health(&self, health: &HealthView) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(health).context("Failed to serialize health status to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(health).context("Failed to serialize health status to YAML")
            }
            OutputFormat::Human => Ok(format_health_human(health)),
        }
    }
}

fn size_label(observation: &LesionObservation) -> String {
    match (observation.size_cm, observation.size_mm) {
        (Some(cm), _) if cm > 0.0 => format!("{} cm", cm),
        (_, Some(mm)) if mm > 0.0 => format!("{} mm", mm),
        _ => "size not reported".to_string(),
    }
}

/// Plain-text overview of every patient and the size course of each lesion
pub fn format_summary(report: &TrackingReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        "LESION TRACKING SUMMARY".to_string(),
        rule.clone(),
        format!("Total Patients: {}", report.total_patients),
        String::new(),
    ];

    for history in &report.patients {
        lines.push(format!("Patient: {}", history.patient_id));

        if let Some(summary) = &history.summary {
            lines.push(format!("  {}", summary));
        }

        lines.push(format!("  Timepoints: {}", history.timepoints.len()));
        if let Some((first, last)) = history.date_range() {
            lines.push(format!("  Date Range: {} to {}", first.date(), last.date()));
        }

        let failed = history.failed_timepoints();
        if failed > 0 {
            lines.push(format!("  Failed Extractions: {}", failed));
        }

        let lesion_ids = history.all_lesion_ids();
        lines.push(format!("  Unique Lesions: {}", lesion_ids.len()));

        if !lesion_ids.is_empty() {
            lines.push(format!("  Lesion IDs: {}", lesion_ids.join(", ")));

            for lesion_id in &lesion_ids {
                let timeline = history.lesion_timeline(lesion_id);
                let Some(first) = timeline.first() else {
                    continue;
                };
                lines.push(format!("    {} ({}):", lesion_id, first.location));
                for observation in &timeline {
                    lines.push(format!(
                        "      - {}: {}",
                        observation.observed_at.format("%Y-%m-%d"),
                        size_label(observation)
                    ));
                }
            }
        }

        lines.push(String::new());
    }

    lines.push(rule);
    lines.join("\n")
}

fn format_timeline_human(history: &PatientHistory, views: &[LesionTimelineView]) -> String {
    let mut output = format!("Patient: {}\n", history.patient_id);

    if views.is_empty() {
        output.push_str("  No lesions tracked\n");
        return output;
    }

    for view in views {
        if view.observations.is_empty() {
            output.push_str(&format!("  {}: not found\n", view.lesion_id));
            continue;
        }

        output.push_str(&format!("  {}\n", view.lesion_id));
        for observation in &view.observations {
            output.push_str(&format!(
                "    {}  {:<12} {}",
                observation.observed_at.format("%Y-%m-%d"),
                size_label(observation),
                observation.location
            ));
            if let Some(characteristics) = &observation.characteristics {
                output.push_str(&format!(" ({})", characteristics));
            }
            output.push('\n');
        }
    }

    output
}

fn format_health_human(health: &HealthView) -> String {
    let mut output = String::new();

    if health.reachable {
        output.push_str(&format!("\u{2713} Ollama reachable at {}\n", health.host));
    } else {
        output.push_str(&format!("\u{2717} Ollama not reachable at {}\n", health.host));
        if let Some(error) = &health.error {
            output.push_str(&format!("  Error: {}\n", error));
        }
        output.push_str("  Ensure Ollama is running: ollama serve\n");
        return output;
    }

    if health.model_installed {
        output.push_str(&format!("\u{2713} Model {} is installed\n", health.model));
    } else {
        output.push_str(&format!("\u{2717} Model {} is not installed\n", health.model));
        output.push_str(&format!("  Install it with: ollama pull {}\n", health.model));
    }

    if !health.models.is_empty() {
        output.push_str(&format!("  Available models: {}\n", health.models.join(", ")));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Timepoint;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn observation(id: &str, when: NaiveDateTime, size_cm: Option<f64>, size_mm: Option<f64>) -> LesionObservation {
        LesionObservation {
            lesion_id: id.to_string(),
            location: "right upper lobe".to_string(),
            size_mm,
            size_cm,
            characteristics: None,
            observed_at: when,
            raw_text: None,
        }
    }

    fn history() -> PatientHistory {
        PatientHistory {
            patient_id: "P001".to_string(),
            timepoints: vec![
                Timepoint {
                    date: at(1, 15),
                    source_text: "baseline".to_string(),
                    observations: vec![observation("L1", at(1, 15), Some(2.3), None)],
                    extraction_error: None,
                },
                Timepoint {
                    date: at(4, 15),
                    source_text: "follow-up".to_string(),
                    observations: vec![observation("L1", at(4, 15), None, Some(28.0))],
                    extraction_error: None,
                },
                Timepoint {
                    date: at(7, 15),
                    source_text: "second follow-up".to_string(),
                    observations: Vec::new(),
                    extraction_error: Some("Extraction failed after 3 attempts: timeout".to_string()),
                },
            ],
            summary: None,
        }
    }

    #[test]
    fn test_human_summary() {
        let report = TrackingReport::new(vec![history(), PatientHistory::failed("P002", "no reports")]);
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_report(&report)
            .unwrap();

        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.contains("LESION TRACKING SUMMARY"));
        assert!(text.contains("Total Patients: 2"));
        assert!(text.contains("  Date Range: 2024-01-15 to 2024-07-15"));
        assert!(text.contains("  Failed Extractions: 1"));
        assert!(text.contains("    L1 (right upper lobe):"));
        assert!(text.contains("      - 2024-01-15: 2.3 cm"));
        assert!(text.contains("      - 2024-04-15: 28 mm"));
        assert!(text.contains("  Tracking failed: no reports"));
    }

    #[test]
    fn test_json_report_is_envelope() {
        let report = TrackingReport::new(vec![history()]);
        let json = OutputFormatter::new(OutputFormat::Json)
            .format_report(&report)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_patients"], 1);
    }

    #[test]
    fn test_timeline_for_one_lesion() {
        let history = history();
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_timeline(&history, Some("L1"))
            .unwrap();
        assert!(text.contains("2024-01-15"));
        assert!(text.contains("2024-04-15"));

        let missing = OutputFormatter::new(OutputFormat::Human)
            .format_timeline(&history, Some("L999"))
            .unwrap();
        assert!(missing.contains("L999: not found"));
    }

    #[test]
    fn test_timeline_json() {
        let history = history();
        let json = OutputFormatter::new(OutputFormat::Json)
            .format_timeline(&history, None)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["lesion_id"], "L1");
        assert_eq!(value[0]["observations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_health_views() {
        let healthy = HealthView::from_probe(
            "http://localhost:11434",
            "llama3.1:8b",
            Ok(OllamaHealth {
                host: "http://localhost:11434".to_string(),
                models: vec!["llama3.1:8b".to_string()],
            }),
        );
        assert!(healthy.is_healthy());

        let down = HealthView::from_probe("http://localhost:1", "llama3.1:8b", Err("refused".to_string()));
        assert!(!down.is_healthy());
        let text = OutputFormatter::new(OutputFormat::Human)
            .format_health(&down)
            .unwrap();
        assert!(text.contains("not reachable"));
        assert!(text.contains("refused"));
    }
}
