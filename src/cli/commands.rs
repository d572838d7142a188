use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::llm::RecordingMode;

/// Longitudinal lesion tracking across radiology reports
#[derive(Parser, Debug)]
#[command(
    name = "oncotrack",
    about = "Track lesions across a patient's radiology reports with a language model",
    version,
    long_about = "oncotrack reads dated radiology reports, asks a language model to extract \
                  every lesion per report, and keeps lesion identifiers continuous across \
                  each patient's timepoints."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only errors are logged"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Track lesions for every patient in a report file",
        long_about = "Loads reports from a CSV or JSON file, tracks each patient's lesions \
                      through their reports in date order, and writes the results.\n\n\
                      Examples:\n  \
                      oncotrack track reports.csv\n  \
                      oncotrack track reports.json --format json -o results.json\n  \
                      oncotrack track reports.csv --patient P001 --model qwen2.5:7b"
    )]
    Track(TrackArgs),

    #[command(
        about = "Show the size course of lesions from a results file",
        long_about = "Reads a JSON results file written by `track --format json` and prints \
                      the chronological observations of one lesion, or of every lesion of \
                      the patient.\n\n\
                      Examples:\n  \
                      oncotrack timeline results.json --patient P001\n  \
                      oncotrack timeline results.json --patient P001 --lesion L2"
    )]
    Timeline(TimelineArgs),

    #[command(
        about = "Check that the model server is reachable",
        long_about = "Queries the Ollama host for its installed models and reports whether \
                      the configured model is available."
    )]
    Health(HealthArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct TrackArgs {
    #[arg(value_name = "INPUT", help = "CSV or JSON file of reports")]
    pub input: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name (e.g. 'llama3.1:8b')")]
    pub model: Option<String>,

    #[arg(long, value_name = "URL", help = "Model server URL")]
    pub host: Option<String>,

    #[arg(long, value_name = "T", help = "Sampling temperature (0.0-2.0)")]
    pub temperature: Option<f32>,

    #[arg(long, value_name = "N", help = "Attempts per report before giving up")]
    pub max_retries: Option<u32>,

    #[arg(long, value_name = "N", help = "Patients tracked in parallel")]
    pub concurrency: Option<usize>,

    #[arg(long, value_name = "ID", help = "Only track this patient")]
    pub patient: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Record model exchanges to, or replay them from, this directory"
    )]
    pub recordings: Option<PathBuf>,

    #[arg(
        long,
        value_enum,
        value_name = "MODE",
        requires = "recordings",
        help = "How recordings are used (defaults to ONCOTRACK_RECORDING_MODE, then auto)"
    )]
    pub recording_mode: Option<RecordingModeArg>,
}

#[derive(Parser, Debug, Clone)]
pub struct TimelineArgs {
    #[arg(value_name = "RESULTS", help = "JSON results file written by `track`")]
    pub results: PathBuf,

    #[arg(long, value_name = "ID", help = "Patient to show")]
    pub patient: String,

    #[arg(long, value_name = "ID", help = "Only show this lesion")]
    pub lesion: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(long, value_name = "URL", help = "Model server URL")]
    pub host: Option<String>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model expected to be installed")]
    pub model: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingModeArg {
    Record,
    Replay,
    Auto,
}

impl From<RecordingModeArg> for RecordingMode {
    fn from(arg: RecordingModeArg) -> Self {
        match arg {
            RecordingModeArg::Record => RecordingMode::Record,
            RecordingModeArg::Replay => RecordingMode::Replay,
            RecordingModeArg::Auto => RecordingMode::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_track_args() {
        let args = CliArgs::parse_from(["oncotrack", "track", "reports.csv"]);
        match args.command {
            Commands::Track(track) => {
                assert_eq!(track.input, PathBuf::from("reports.csv"));
                assert_eq!(track.format, OutputFormatArg::Human);
                assert!(track.output.is_none());
                assert!(track.model.is_none());
                assert!(track.patient.is_none());
                assert!(track.recordings.is_none());
            }
            _ => panic!("Expected Track command"),
        }
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_track_with_options() {
        let args = CliArgs::parse_from([
            "oncotrack",
            "track",
            "reports.json",
            "--format",
            "json",
            "-o",
            "out/results.json",
            "-m",
            "qwen2.5:7b",
            "--host",
            "http://gpu-box:11434",
            "--temperature",
            "0.2",
            "--max-retries",
            "5",
            "--concurrency",
            "8",
            "--patient",
            "P001",
            "--recordings",
            "recordings",
            "--recording-mode",
            "replay",
        ]);

        match args.command {
            Commands::Track(track) => {
                assert_eq!(track.format, OutputFormatArg::Json);
                assert_eq!(track.output, Some(PathBuf::from("out/results.json")));
                assert_eq!(track.model.as_deref(), Some("qwen2.5:7b"));
                assert_eq!(track.host.as_deref(), Some("http://gpu-box:11434"));
                assert_eq!(track.temperature, Some(0.2));
                assert_eq!(track.max_retries, Some(5));
                assert_eq!(track.concurrency, Some(8));
                assert_eq!(track.patient.as_deref(), Some("P001"));
                assert_eq!(track.recording_mode, Some(RecordingModeArg::Replay));
            }
            _ => panic!("Expected Track command"),
        }
    }

    #[test]
    fn test_recording_mode_requires_directory() {
        let result = CliArgs::try_parse_from([
            "oncotrack",
            "track",
            "reports.csv",
            "--recording-mode",
            "record",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_timeline_command() {
        let args = CliArgs::parse_from([
            "oncotrack",
            "timeline",
            "results.json",
            "--patient",
            "P001",
            "--lesion",
            "L2",
        ]);
        match args.command {
            Commands::Timeline(timeline) => {
                assert_eq!(timeline.patient, "P001");
                assert_eq!(timeline.lesion.as_deref(), Some("L2"));
            }
            _ => panic!("Expected Timeline command"),
        }
    }

    #[test]
    fn test_timeline_requires_patient() {
        assert!(CliArgs::try_parse_from(["oncotrack", "timeline", "results.json"]).is_err());
    }

    #[test]
    fn test_health_command_and_global_flags() {
        let args = CliArgs::parse_from(["oncotrack", "-vv", "health", "-m", "llama3.1:8b"]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Commands::Health(health) => {
                assert!(health.host.is_none());
                assert_eq!(health.model.as_deref(), Some("llama3.1:8b"));
            }
            _ => panic!("Expected Health command"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["oncotrack", "-q", "-v", "health"]).is_err());
    }
}
