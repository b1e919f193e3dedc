//! CLI command implementations.

pub mod call;
pub mod config;
pub mod serve;
pub mod slot;

use anyhow::Result;
use std::path::Path;

use crate::config::{Config, ExecutionMode};

/// Load the configuration and apply the global `--dry-run` override.
pub(crate) fn load_config(config_path: &Path, dry_run: bool) -> Result<Config> {
    let mut config = Config::load_or_default(config_path)?;
    if dry_run {
        config.engine.mode = ExecutionMode::DryRun;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dry_run_overrides_config_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "engine:\n  mode: live\n").unwrap();

        assert_eq!(load_config(&path, false).unwrap().engine.mode, ExecutionMode::Live);
        assert_eq!(load_config(&path, true).unwrap().engine.mode, ExecutionMode::DryRun);
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml"), true).unwrap();
        assert_eq!(config.tables.block_source, "blocklist");
    }
}
