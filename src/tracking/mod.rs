//! Lesion tracking across a patient's timepoints

mod model;
mod tracker;

pub use model::{LesionObservation, PatientHistory, Timepoint};
pub use tracker::{prior_summaries, LesionTracker, TrackingError};
