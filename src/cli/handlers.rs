//! Subcommand handlers; each returns the process exit code

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::commands::{HealthArgs, TimelineArgs, TrackArgs};
use super::output::{HealthView, OutputFormat, OutputFormatter};
use crate::config::TrackerConfig;
use crate::llm::{check_ollama, GenAIClient, LLMClient, RecordingLLMClient, RecordingMode};
use crate::output::TrackingReport;
use crate::reports::{Report, ReportLoader};
use crate::tracking::LesionTracker;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment configuration with `track` flags applied on top
pub fn track_config(args: &TrackArgs) -> Result<TrackerConfig> {
    let mut config = TrackerConfig::from_env().context("Invalid environment configuration")?;

    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    config.validate().context("Configuration error")?;
    Ok(config)
}

fn build_client(config: &TrackerConfig, args: &TrackArgs) -> Result<Arc<dyn LLMClient>> {
    let client: Arc<dyn LLMClient> = Arc::new(
        GenAIClient::from_config(config)
            .map_err(|e| anyhow!("Failed to initialize model client: {}", e))?,
    );

    let Some(dir) = &args.recordings else {
        return Ok(client);
    };

    let mode = args
        .recording_mode
        .map(RecordingMode::from)
        .unwrap_or_else(|| RecordingMode::from_env(RecordingMode::Auto));
    debug!(dir = %dir.display(), ?mode, "Recording enabled");

    let recording = RecordingLLMClient::new(client, mode, dir.clone())?;
    Ok(Arc::new(recording))
}

fn select_patients(
    mut timelines: BTreeMap<String, Vec<Report>>,
    patient: Option<&str>,
) -> Result<BTreeMap<String, Vec<Report>>> {
    let Some(patient_id) = patient else {
        return Ok(timelines);
    };

    let reports = timelines
        .remove(patient_id)
        .ok_or_else(|| anyhow!("Patient {} not found in input", patient_id))?;
    Ok(BTreeMap::from([(patient_id.to_string(), reports)]))
}

async fn run_track(args: &TrackArgs) -> Result<()> {
    let config = track_config(args)?;
    debug!("Configuration:\n{}", config);

    let store = ReportLoader::new(&config)
        .load_path(&args.input)
        .with_context(|| format!("Failed to load reports from {}", args.input.display()))?;
    info!(
        reports = store.len(),
        patients = store.patient_ids().len(),
        "Reports loaded"
    );

    let timelines = select_patients(store.patient_timelines(), args.patient.as_deref())?;

    let client = build_client(&config, args)?;
    let tracker = LesionTracker::from_config(client, &config);
    let histories = tracker.track_all(timelines).await;

    let report = TrackingReport::new(histories);
    let failed = report.failed_patients();
    if failed > 0 {
        warn!(failed, total = report.total_patients, "Some patients could not be tracked");
    }

    let formatted = OutputFormatter::new(OutputFormat::from(args.format)).format_report(&report)?;

    match &args.output {
        Some(path) => {
            TrackingReport::write_to(path, &formatted)?;
            info!(path = %path.display(), "Results written");
        }
        None => println!("{}", formatted),
    }

    Ok(())
}

pub async fn handle_track(args: &TrackArgs) -> i32 {
    info!("Starting lesion tracking");

    match run_track(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

fn run_timeline(args: &TimelineArgs) -> Result<()> {
    let report = TrackingReport::load(&args.results)?;
    let history = report
        .patient(&args.patient)
        .ok_or_else(|| anyhow!("Patient {} not found in {}", args.patient, args.results.display()))?;

    let formatted = OutputFormatter::new(OutputFormat::from(args.format))
        .format_timeline(history, args.lesion.as_deref())?;
    println!("{}", formatted);
    Ok(())
}

pub async fn handle_timeline(args: &TimelineArgs) -> i32 {
    match run_timeline(args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    info!("Checking model server health");

    let config = match TrackerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid environment configuration: {}", e);
            return 1;
        }
    };

    let host = args.host.clone().unwrap_or(config.host);
    let model = args.model.clone().unwrap_or(config.model);

    let probe = check_ollama(&host, HEALTH_TIMEOUT)
        .await
        .map_err(|e| e.to_string());
    let health = HealthView::from_probe(&host, &model, probe);

    match OutputFormatter::new(OutputFormat::from(args.format)).format_health(&health) {
        Ok(formatted) => println!("{}", formatted),
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    }

    if health.is_healthy() {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{CliArgs, Commands};
    use chrono::NaiveDate;
    use clap::Parser;
    use serial_test::serial;

    fn track_args(extra: &[&str]) -> TrackArgs {
        let mut argv = vec!["oncotrack", "track", "reports.csv"];
        argv.extend_from_slice(extra);
        match CliArgs::parse_from(argv).command {
            Commands::Track(args) => args,
            _ => panic!("Expected Track command"),
        }
    }

    fn report(patient: &str) -> Report {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Report::new(patient, date, "CT chest").unwrap()
    }

    #[test]
    #[serial]
    fn test_flags_override_defaults() {
        let config = track_config(&track_args(&["-m", "qwen2.5:7b", "--max-retries", "5"])).unwrap();
        assert_eq!(config.model, "qwen2.5:7b");
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    #[serial]
    fn test_invalid_flag_value_fails_validation() {
        assert!(track_config(&track_args(&["--concurrency", "0"])).is_err());
        assert!(track_config(&track_args(&["--temperature", "3.5"])).is_err());
    }

    #[test]
    fn test_select_patients() {
        let mut timelines = BTreeMap::new();
        timelines.insert("P001".to_string(), vec![report("P001")]);
        timelines.insert("P002".to_string(), vec![report("P002")]);

        let all = select_patients(timelines.clone(), None).unwrap();
        assert_eq!(all.len(), 2);

        let one = select_patients(timelines.clone(), Some("P002")).unwrap();
        assert_eq!(one.keys().collect::<Vec<_>>(), vec!["P002"]);

        assert!(select_patients(timelines, Some("P404")).is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_track_missing_input_fails() {
        let args = track_args(&[]);
        let args = TrackArgs {
            input: "/nonexistent/reports.csv".into(),
            ..args
        };
        assert_eq!(handle_track(&args).await, 1);
    }
}
