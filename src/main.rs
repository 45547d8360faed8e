//! LedFx Supervisor - Run several LedFx cores side by side
//!
//! A headless process that spawns named LedFx core instances, tracks their
//! lifecycle, polls them for readiness and reports status to the UI over
//! JSON lines on stdin/stdout.

mod core;
mod ipc;
mod persistence;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use single_instance::SingleInstance;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::settings::DATA_DIR_ENV;
use crate::core::{Flow, InstanceSupervisor, Settings};
use crate::persistence::Database;

/// Application name constant
pub const APP_NAME: &str = "LedFx Supervisor";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Time given to the stdio tasks after the supervisor has finished
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let db = Database::new(&database_directory()?)?;
    let mut settings = match db.load_settings()? {
        Some(settings) => settings,
        None => {
            // Store the defaults so there is something to edit
            let settings = Settings::default();
            db.save_settings(&settings)?;
            settings
        }
    };
    settings.apply_env_overrides();

    init_logging(settings.debug_logging);
    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Two supervisors would spawn every core twice
    let instance = SingleInstance::new("ledfx-supervisor")
        .context("Failed to create single instance lock")?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        return Ok(());
    }

    match db.cleanup_history(settings.history_retention_days) {
        Ok(0) => {}
        Ok(n) => info!("Purged {} old history entries", n),
        Err(e) => warn!("Failed to purge instance history: {:#}", e),
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let flow = runtime.block_on(serve(settings, db))?;
    // stdin is read on a blocking thread that never returns on its own
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    drop(instance);
    if flow == Flow::Relaunch {
        relaunch()?;
    }

    info!("{} shutting down", APP_NAME);
    Ok(())
}

/// Wire the supervisor to stdin/stdout and run it to completion
async fn serve(settings: Settings, db: Database) -> Result<Flow> {
    let mut supervisor = InstanceSupervisor::new(settings, db)?;

    let (window, writer) = ipc::stdio::spawn_writer("stdout", tokio::io::stdout());
    supervisor.attach_window(Arc::new(window));
    let commands = ipc::stdio::spawn_reader(tokio::io::stdin());

    let flow = supervisor.run(commands).await;

    // The supervisor held the only window, so the writer drains and stops
    if tokio::time::timeout(RUNTIME_SHUTDOWN, writer).await.is_err() {
        warn!("UI channel did not flush in time");
    }
    Ok(flow)
}

/// The database lives in the default data directory unless overridden from
/// the environment, since settings are stored inside it
fn database_directory() -> Result<PathBuf> {
    match std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Database::default_directory(),
    }
}

/// Start a fresh copy of this executable with the same arguments
fn relaunch() -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let child = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .context(format!("Failed to relaunch {:?}", exe))?;
    info!("Relaunched as PID {}", child.id());
    Ok(())
}

/// Initialize the logging system
fn init_logging(debug: bool) {
    let default = if debug {
        "ledfx_supervisor=debug"
    } else {
        "ledfx_supervisor=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout is the UI channel, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
