//! Configuration commands: check-config and init-config.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Load and validate the configuration file. A missing file is an error here.
pub fn check(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    println!("[OK] {} is valid", config_path.display());
    println!("  API listen:    {}", config.api.listen);
    println!(
        "  Auth:          {}",
        if config.api.get_shared_secret().is_empty() {
            "disabled"
        } else {
            "shared secret"
        }
    );
    println!("  Engine:        {} ({})", config.engine.ipfw_path, config.engine.mode);
    println!(
        "  Strict rules:  {}-{} via {}",
        config.strict.rule_base,
        config.strict.rule_base + 255,
        config.strict.interface
    );
    Ok(())
}

/// Write the default configuration.
pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    Config::default().save(config_path)?;
    println!("[OK] Wrote default configuration to {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_then_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("etc").join("config.yaml");

        init(&path, false).unwrap();
        assert!(check(&path).is_ok());
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api: {}\n").unwrap();

        assert!(init(&path, false).is_err());
        assert!(init(&path, true).is_ok());
    }

    #[test]
    fn test_check_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(check(&dir.path().join("absent.yaml")).is_err());
    }
}
