//! Logging setup and the mixer's log macros
//!
//! Everything the engine logs goes to the [`MIXER_TARGET`] target, so its
//! verbosity can be raised without drowning the rest of the process.
//! `RUST_LOG` still wins over the config file when it is set.

use std::fs::File;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use crate::config::{DebugConfig, LogLevel};

/// Target used by [`mixer_trace!`], [`mixer_debug!`] and [`mixer_info!`]
pub const MIXER_TARGET: &str = "mixer";

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Directive raising or lowering the mixer target alone
fn mixer_directive(level: LogLevel) -> Option<Directive> {
    format!("{MIXER_TARGET}={}", LevelFilter::from(level))
        .parse()
        .ok()
}

fn build_filter(config: &DebugConfig) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.log_level).into())
        .from_env_lossy();

    match config.mixer_log_level.and_then(mixer_directive) {
        Some(directive) => filter.add_directive(directive),
        None => filter,
    }
}

/// Install the global subscriber. Calls after the first are ignored.
pub fn init(config: &DebugConfig) {
    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    let log_file = config.log_to_file.then(|| File::create(&config.log_path));
    let (file_layer, file_error) = match log_file {
        Some(Ok(file)) => (Some(fmt::layer().with_writer(file).with_ansi(false)), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(console)
        .with(file_layer)
        .try_init()
        .is_ok();

    if let (true, Some(err)) = (installed, file_error) {
        tracing::warn!("Cannot open log file {}: {err}", config.log_path.display());
    }
}

/// Log a mixer trace message (per-frame detail)
#[macro_export]
macro_rules! mixer_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: $crate::logging::MIXER_TARGET, $($arg)*)
    };
}

/// Log a mixer debug message (mode switches, corrections)
#[macro_export]
macro_rules! mixer_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: $crate::logging::MIXER_TARGET, $($arg)*)
    };
}

/// Log a mixer info message (membership and configuration changes)
#[macro_export]
macro_rules! mixer_info {
    ($($arg:tt)*) => {
        tracing::info!(target: $crate::logging::MIXER_TARGET, $($arg)*)
    };
}
