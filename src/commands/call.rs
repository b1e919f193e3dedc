//! Call command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::ExecutionMode;
use crate::ipfw::check_root;
use crate::policy::{Operation, Params, PolicyEngine};

/// Run one operation and print the JSON body the API would return.
///
/// Exits non-zero when the operation did not succeed.
pub async fn run(
    operation: Operation,
    params: Params,
    config_path: &Path,
    dry_run: bool,
) -> Result<()> {
    let config = super::load_config(config_path, dry_run)?;
    if config.engine.mode == ExecutionMode::Live {
        check_root()?;
    }

    let engine = PolicyEngine::from_config(&config)?;
    let response = tokio::task::spawn_blocking(move || engine.dispatch(operation, &params)).await?;

    println!("{}", serde_json::to_string(&response)?);

    if !response.is_success() {
        anyhow::bail!("{} did not succeed", operation);
    }
    Ok(())
}
