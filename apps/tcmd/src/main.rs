use std::sync::Arc;

use tracing::{error, info, warn};

use tcm_ipc::socket::{self, Claim};
use tcm_utils::{ensure_dir, runtime_paths};

mod backup;
mod config;
mod connection;
mod context;
mod daemon;
mod database;
mod dispatch;
mod lock;
mod logs;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let logs = logs::LogStore::new(2000);
    tracing_subscriber::fmt().with_writer(logs.daemon_writer()).init();

    let paths = runtime_paths();
    ensure_dir(&paths.runtime_dir)?;

    // single-instance lock
    let Some(_guard) = lock::acquire(&paths.lock_path)? else {
        warn!("daemon already running (lock held), exiting");
        return Ok(());
    };

    let listener = match socket::claim(&paths.socket_path).await? {
        Claim::Bound(listener) => listener,
        Claim::InUse => {
            warn!("daemon already running (socket alive), exiting");
            return Ok(());
        }
    };

    let settings = match config::load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            error!("failed to load settings: {err}");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, err));
        }
    };
    let collaborators = context::Collaborators::from_settings(&settings);
    let ctx = match context::Context::new(settings, logs, collaborators) {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => {
            error!("failed to initialise daemon: {err}");
            return Err(std::io::Error::other(err.to_string()));
        }
    };

    info!("tcmd listening at {:?}", paths.socket_path);
    tokio::select! {
        served = daemon::serve(listener, ctx) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
            let _ = std::fs::remove_file(&paths.socket_path);
            Ok(())
        }
    }
}
