//! Structured logging setup
//!
//! Installs a `tracing-subscriber` registry writing to stderr, so stdout only
//! ever carries tracking results. The crate's own level comes from the
//! configuration; `RUST_LOG` directives are honored on top of it, and noisy
//! HTTP dependencies are held at `warn` unless `RUST_LOG` says otherwise.
//!
//! ```no_run
//! use oncotrack::util::{init_logging, LoggingConfig};
//! use tracing::{info, Level};
//!
//! init_logging(LoggingConfig::with_level(Level::DEBUG));
//! info!(patient_id = "P001", "Tracking patient");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

const QUIET_DEPENDENCIES: [&str; 3] = ["h2=warn", "hyper=warn", "reqwest=warn"];

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: Level,

    /// One JSON object per event instead of human-readable lines
    pub use_json: bool,

    pub include_target: bool,

    /// File and line of the emitting call site
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn json(mut self, use_json: bool) -> Self {
        self.use_json = use_json;
        self
    }

    /// Debug builds of the config carry targets and call sites
    pub fn verbose(mut self) -> Self {
        self.include_target = true;
        self.include_location = self.level >= Level::DEBUG;
        self
    }
}

/// Parses a level name case-insensitively
pub fn parse_level(level_str: &str) -> Option<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Shifts `base` by `-v` (more detail) or `-q` (errors only) flags
pub fn level_from_flags(base: Level, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => base,
        1 => std::cmp::max(base, Level::DEBUG),
        _ => Level::TRACE,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();

    if let Ok(directive) = format!("oncotrack={}", level).parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for quiet in QUIET_DEPENDENCIES {
            if let Ok(directive) = quiet.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Installs the global subscriber; later calls are no-ops
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location);

        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init()
        } else {
            tracing_subscriber::registry().with(filter).with(layer).try_init()
        };

        if let Err(e) = result {
            eprintln!("Logging already initialized: {}", e);
        }
    });
}

/// Reads `ONCOTRACK_LOG_LEVEL` and `ONCOTRACK_LOG_JSON`
pub fn config_from_env() -> LoggingConfig {
    let level = env::var("ONCOTRACK_LOG_LEVEL")
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let use_json = env::var("ONCOTRACK_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig::with_level(level).json(use_json)
}

pub fn init_from_env() {
    init_logging(config_from_env());
}
