//! Entry point for `shepd`, the Shepherd daemon binary.
//!
//! Exit code 0 covers every defined halt condition — orderly stops,
//! policy violations, agent failures — all of which are logged to the
//! configured log file. A non-zero exit means a fault before the logger
//! existed (unreadable project root or config) or something truly
//! unexpected.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use shep_daemon::{logging, run, LoopError};
use shep_state::StateStore;

/// Deterministic task-shepherd daemon.
#[derive(Parser)]
#[command(name = "shepd", version, about)]
struct Cli {
    /// Path to the target project root (contains `<state_dir>/config.json`).
    #[arg(long)]
    project_root: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let bootstrap = StateStore::bootstrap(&cli.project_root)?;
    let config = bootstrap.load_config()?;
    let store = StateStore::for_config(
        &cli.project_root,
        &config,
        bootstrap.config_path().to_path_buf(),
    )?;

    logging::init(&config, store.project_root())?;
    info!("Shepherd starting.");

    match run::run(&store, &config) {
        Ok(()) => {}
        Err(LoopError::Stop(message)) => error!("Execution stopped: {message}"),
        Err(LoopError::Agent(err)) => error!("Agent error: {err}"),
        Err(err) => error!("Execution halted: {err}"),
    }
    info!("Shepherd exiting.");
    Ok(())
}
