//! Configuration management for dynfw.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::allocator::StrictLayout;
use crate::error::DynfwError;
use crate::validation::validate_table_name;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dynfw/config.yaml";

/// Environment variable consulted for the API shared secret
pub const SHARED_SECRET_ENV: &str = "DYNFW_SHARED_SECRET";

/// Secure string type that zeroizes memory on drop
/// Used for the API shared secret
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP API settings
    pub api: ApiConfig,

    /// How filter-engine commands are executed
    pub engine: EngineConfig,

    /// Names of the predefined ipfw tables
    pub tables: TablesConfig,

    /// Strict-monitoring rule layout
    pub strict: StrictConfig,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// A file that exists but fails to parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            warn!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for name in self.tables.names() {
            validate_table_name(name).context("Invalid entry in 'tables'")?;
        }
        StrictLayout::from_config(&self.strict).context("Invalid 'strict' section")?;

        if self.engine.command_timeout_secs == 0 {
            return Err(DynfwError::Config(
                "engine.command_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.engine.ipfw_path.trim().is_empty() {
            return Err(DynfwError::Config("engine.ipfw_path cannot be empty".to_string()).into());
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).with_context(|| "Failed to serialize config")?;

        let parent_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", parent_dir))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the HTTP API binds to
    pub listen: SocketAddr,

    /// Shared secret expected in the `X-Dynfw-Token` header (empty disables)
    /// Memory is securely zeroed when dropped
    pub shared_secret: SecureString,

    /// Environment variable name to read the secret from (optional)
    pub shared_secret_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([192, 168, 10, 1], 6466)),
            shared_secret: SecureString::default(),
            shared_secret_env: None,
        }
    }
}

impl ApiConfig {
    /// Get the effective secret, checking env vars before the config value
    pub fn get_shared_secret(&self) -> SecureString {
        if let Some(ref env_name) = self.shared_secret_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(SHARED_SECRET_ENV) {
            return SecureString::new(val);
        }
        self.shared_secret.clone()
    }
}

/// Execution mode for filter-engine commands
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Run commands against the live ipfw
    #[default]
    Live,
    /// Log commands without running them
    DryRun,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Live => f.write_str("live"),
            ExecutionMode::DryRun => f.write_str("dry-run"),
        }
    }
}

/// Engine configuration, built once and handed to the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    pub ipfw_path: String,
    /// Upper bound for a single ipfw invocation
    pub command_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Live,
            ipfw_path: "/sbin/ipfw".to_string(),
            command_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Source addresses denied at the gateway
    pub block_source: String,
    /// Destination addresses denied for every client
    pub block_target: String,
    /// Clients cut off from the external network
    pub lockdown: String,
    /// Destinations routed through the forwarding path
    pub forward: String,
    /// Destinations allowed by perimeter-zone analysis
    pub dmz_allow: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            block_source: "blocklist".to_string(),
            block_target: "tblocklist".to_string(),
            lockdown: "lockdownlist".to_string(),
            forward: "fwdlist".to_string(),
            dmz_allow: "dmzallowlist".to_string(),
        }
    }
}

impl TablesConfig {
    fn names(&self) -> [&str; 5] {
        [
            &self.block_source,
            &self.block_target,
            &self.lockdown,
            &self.forward,
            &self.dmz_allow,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictConfig {
    /// Table mapping monitored clients to their skip-to rule number
    pub hosts_table: String,
    /// Rule number of client index 0
    pub rule_base: u32,
    /// Rule that allowed traffic skips to
    pub allow_rule: u32,
    /// Interface the per-client rules match on
    pub interface: String,
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            hosts_table: "strict_hosts_list".to_string(),
            rule_base: 4000,
            allow_rule: 502,
            interface: "bridge0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strict.rule_base, 4000);
        assert_eq!(config.strict.allow_rule, 502);
        assert_eq!(config.strict.interface, "bridge0");
        assert_eq!(config.api.listen.port(), 6466);
        assert_eq!(config.engine.mode, ExecutionMode::Live);
    }

    #[test]
    fn test_load_partial_yaml_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "engine:\n  mode: dry-run\nstrict:\n  interface: igb1\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.engine.mode, ExecutionMode::DryRun);
        assert_eq!(config.strict.interface, "igb1");
        assert_eq!(config.strict.hosts_table, "strict_hosts_list");
        assert_eq!(config.tables.block_source, "blocklist");
    }

    #[test]
    fn test_load_rejects_bad_table_name() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tables:\n  forward: \"fwd list\"\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "strict: [not, a, map").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/dynfw/config.yaml").unwrap();
        assert_eq!(config.tables.forward, "fwdlist");
    }

    #[test]
    fn test_validate_rule_base_range() {
        let mut config = Config::default();
        config.strict.rule_base = 65400;
        assert!(config.validate().is_err());
        config.strict.rule_base = 65280;
        assert!(config.validate().is_ok());
        config.strict.rule_base = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DynfwError>(),
            Some(DynfwError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rule_base_does_not_overflow() {
        let mut config = Config::default();
        config.strict.rule_base = u32::MAX;
        assert!(config.validate().is_err());
        config.strict.rule_base = u32::MAX - 254;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allow_rule_range() {
        let mut config = Config::default();
        config.strict.allow_rule = 65536;
        assert!(config.validate().is_err());
        config.strict.allow_rule = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.engine.command_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.strict.allow_rule = 600;
        config.engine.mode = ExecutionMode::DryRun;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.strict.allow_rule, 600);
        assert_eq!(loaded.engine.mode, ExecutionMode::DryRun);
    }

    #[test]
    fn test_secure_string_redacted() {
        let secret = SecureString::from("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.as_str(), "hunter2");
    }

    #[test]
    fn test_shared_secret_from_custom_env() {
        let api = ApiConfig {
            shared_secret: SecureString::from("from-file"),
            shared_secret_env: Some("DYNFW_TEST_SECRET_CUSTOM".to_string()),
            ..ApiConfig::default()
        };
        env::set_var("DYNFW_TEST_SECRET_CUSTOM", "from-env");
        assert_eq!(api.get_shared_secret().as_str(), "from-env");
        env::remove_var("DYNFW_TEST_SECRET_CUSTOM");
    }

    #[test]
    fn test_execution_mode_display() {
        assert_eq!(ExecutionMode::Live.to_string(), "live");
        assert_eq!(ExecutionMode::DryRun.to_string(), "dry-run");
    }
}
