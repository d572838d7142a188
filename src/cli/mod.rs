pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, HealthArgs, OutputFormatArg, TimelineArgs, TrackArgs};
pub use handlers::{handle_health, handle_timeline, handle_track};
pub use output::{OutputFormat, OutputFormatter};
