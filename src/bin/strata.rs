//! Strata CLI Binary
//!
//! Command-line interface for inspecting layered XML configuration chains.

use clap::Parser;
use std::process;
use strata::cli::{run, Cli};
use strata::logging::{init_logging, LoggingConfig};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    info!("strata CLI starting");

    match run(&cli) {
        Ok(output) => {
            info!("command completed");
            println!("{output}");
        }
        Err(e) => {
            error!("command failed: {e}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI flags over the defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = LoggingConfig::default();
    // Inspection output goes to stdout; keep logs on stderr and quiet by
    // default so the two never interleave.
    config.level = "warn".to_string();
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.format = format.clone();
    }
    config
}
