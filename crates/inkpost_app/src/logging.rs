//! Logger setup for the `inkpost` binary.

use std::fs::OpenOptions;
use std::path::PathBuf;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

pub const DEFAULT_LOG_FILE: &str = "./inkpost.log";

/// Where log records end up. Stderr is always included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Terminal,
    TerminalAndFile(PathBuf),
}

/// Maps the `-v` count to a level.
pub fn level_for(verbose: u8) -> LevelFilter {
    [
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ][usize::from(verbose.min(3))]
}

pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let config = record_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    if let LogDestination::TerminalAndFile(path) = destination {
        // The file keeps at least info records even when the terminal is quiet.
        let file_level = level.max(LevelFilter::Info);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => loggers.push(WriteLogger::new(file_level, config, file)),
            Err(err) => eprintln!("inkpost: log file {} unavailable: {err}", path.display()),
        }
    }

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("inkpost: a logger was already installed");
    }
}

fn record_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_allow_str("inkpost")
        .build()
}
