// logging.rs — File-only tracing sink.
//
// The shepherd logs to the configured log file and nowhere else: stdout
// and stderr stay clean, and nothing propagates to a default subscriber.
// The log directory must already exist; the shepherd creates state files,
// never directories.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;

use shep_state::{Config, LogLevel, StateError};

/// Install the global file subscriber per the loaded config.
pub fn init(config: &Config, project_root: &Path) -> Result<(), StateError> {
    let mut log_path = PathBuf::from(&config.log_file);
    if !log_path.is_absolute() {
        log_path = project_root.join(log_path);
    }
    let parent = log_path.parent().ok_or_else(|| {
        StateError::Missing(format!("Log directory missing for {}", log_path.display()))
    })?;
    if !parent.exists() {
        return Err(StateError::Missing(format!(
            "Log directory missing: {}",
            parent.display()
        )));
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|err| StateError::Io {
            path: log_path.clone(),
            source: err,
        })?;

    tracing_subscriber::fmt()
        .with_max_level(max_level(config.log_level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn max_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warning => Level::WARN,
        // tracing has no level above ERROR; `critical` maps onto it.
        LogLevel::Error | LogLevel::Critical => Level::ERROR,
    }
}
