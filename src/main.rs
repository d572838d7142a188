use oncotrack::cli::commands::{CliArgs, Commands};
use oncotrack::cli::handlers::{handle_health, handle_timeline, handle_track};
use oncotrack::util::{init_logging, level_from_flags, logging, parse_level, LoggingConfig};
use oncotrack::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("oncotrack v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Track(track_args) => handle_track(track_args).await,
        Commands::Timeline(timeline_args) => handle_timeline(timeline_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = logging::config_from_env();

    if let Some(level_str) = &args.log_level {
        match parse_level(level_str) {
            Some(level) => config.level = level,
            None => eprintln!(
                "Invalid log level '{}', using {}. Valid levels: trace, debug, info, warn, error",
                level_str, config.level
            ),
        }
    }

    let config = LoggingConfig {
        level: level_from_flags(config.level, args.verbose, args.quiet),
        ..config
    };
    let config = if args.verbose > 0 { config.verbose() } else { config };

    init_logging(config);
}
