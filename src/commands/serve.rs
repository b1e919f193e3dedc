//! Serve command implementation.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::api::ApiServer;
use crate::config::ExecutionMode;
use crate::ipfw::check_root;
use crate::lock::LockGuard;
use crate::policy::PolicyEngine;
use crate::signal::{is_shutdown_requested, shutdown_signal};

/// Run the HTTP API until SIGINT or SIGTERM.
pub async fn run(
    config_path: &Path,
    dry_run: bool,
    listen: Option<SocketAddr>,
    lock_file: &Path,
) -> Result<()> {
    let mut config = super::load_config(config_path, dry_run)?;
    if let Some(listen) = listen {
        config.api.listen = listen;
    }

    // Dry-run never touches ipfw, so it needs neither root nor the lock
    let _lock = match config.engine.mode {
        ExecutionMode::Live => {
            check_root()?;
            Some(LockGuard::acquire(lock_file)?)
        }
        ExecutionMode::DryRun => None,
    };

    info!(
        "dynfw {} starting ({} mode, ipfw at {})",
        env!("CARGO_PKG_VERSION"),
        config.engine.mode,
        config.engine.ipfw_path
    );

    let engine = PolicyEngine::from_config(&config)?;
    ApiServer::new(&config.api, engine)
        .run(shutdown_signal())
        .await?;

    if is_shutdown_requested() {
        info!("dynfw stopped");
    }
    Ok(())
}
