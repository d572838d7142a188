//! oncotrack - longitudinal lesion tracking over radiology reports
//!
//! A language model extracts the lesions described in each dated report of a
//! patient. The tracker walks the reports in date order and hands the model
//! the previous timepoint's lesions, so that a lesion seen again keeps the
//! identifier it was first given.
//!
//! # Core Concepts
//!
//! - **Report**: one dated free-text radiology report for one patient
//! - **Timepoint**: the lesions extracted from one report
//! - **Patient history**: a patient's timepoints in chronological order, from
//!   which per-lesion timelines are derived
//! - **Extraction oracle**: the model behind [`llm::LLMClient`]; identity
//!   matching between timepoints is entirely its call
//!
//! # Example Usage
//!
//! ```ignore
//! use oncotrack::{LesionTracker, ReportLoader, TrackerConfig, GenAIClient};
//! use std::sync::Arc;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = TrackerConfig::from_env()?;
//!     let store = ReportLoader::new(&config).load_path("reports.csv".as_ref())?;
//!
//!     let client = Arc::new(GenAIClient::from_config(&config)?);
//!     let tracker = LesionTracker::from_config(client, &config);
//!
//!     for history in tracker.track_all(store.patient_timelines()).await {
//!         println!("{}: {:?}", history.patient_id, history.all_lesion_ids());
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod extraction;
pub mod llm;
pub mod output;
pub mod reports;
pub mod tracking;
pub mod util;

pub use config::{ConfigError, TrackerConfig};
pub use extraction::{ExtractionOutcome, LesionExtractor, PriorLesionSummary};
pub use llm::{BackendError, GenAIClient, LLMClient, MockLLMClient};
pub use output::TrackingReport;
pub use reports::{LoadError, Report, ReportError, ReportLoader, ReportStore};
pub use tracking::{LesionObservation, LesionTracker, PatientHistory, Timepoint, TrackingError};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_oncotrack() {
        assert_eq!(NAME, "oncotrack");
    }
}
