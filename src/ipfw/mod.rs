//! ipfw driver: command runner, table store, rule commands and output parsing.

mod parser;
mod rules;
mod tables;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use tracing::debug;

pub use parser::{parse_table_entry, parse_table_listing, TableEntry};
pub use rules::{Destination, Rule, RuleAction, RuleTable};
pub use tables::{AddressSetStore, SetName};

use crate::cmd_abstraction::{
    display_command, CommandExecutor, CommandOutput, DryRunExecutor, RealCommandExecutor,
};
use crate::config::{EngineConfig, ExecutionMode};
use crate::error::{DynfwError, EngineError};

/// Check that the process runs as root; ipfw refuses changes otherwise.
pub fn check_root() -> Result<(), DynfwError> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(DynfwError::Permission(
            "live mode requires root privileges. Run with sudo or use --dry-run.".to_string(),
        ));
    }
    Ok(())
}

/// Build the executor matching the configured execution mode.
pub fn executor_for(config: &EngineConfig) -> Arc<dyn CommandExecutor> {
    match config.mode {
        ExecutionMode::Live => Arc::new(RealCommandExecutor::with_timeout(
            config.command_timeout(),
        )),
        ExecutionMode::DryRun => Arc::new(DryRunExecutor::new()),
    }
}

/// Runs single ipfw commands and turns their exit status into a `Result`.
#[derive(Clone)]
pub struct Ipfw {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl Ipfw {
    pub fn new(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    /// Create a runner from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(executor_for(config), config.ipfw_path.clone())
    }

    /// Run one ipfw command. A non-zero exit status is an error.
    pub fn run(&self, args: &[String]) -> Result<CommandOutput, EngineError> {
        let command = display_command(&self.binary, args);
        debug!("Executing {}", command);

        let output = match self.executor.execute(&self.binary, args) {
            Ok(output) => output,
            Err(e) => {
                return Err(match e.downcast::<EngineError>() {
                    Ok(engine) => engine,
                    Err(other) => EngineError::Spawn {
                        command,
                        reason: format!("{:#}", other),
                    },
                })
            }
        };

        if output.success {
            Ok(output)
        } else {
            Err(EngineError::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

impl std::fmt::Debug for Ipfw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipfw").field("binary", &self.binary).finish()
    }
}
