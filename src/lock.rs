//! File-based locking to prevent concurrent execution.
//!
//! Per-client serialization lives in process memory, so only one dynfw
//! daemon may drive the engine at a time. `serve` holds an flock-style
//! advisory lock for its whole lifetime.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::DynfwError;

pub const DEFAULT_LOCK_FILE: &str = "/var/run/dynfw.lock";

/// Exclusive lock on the dynfw lock file, released on drop.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock.
    /// Returns an error if another instance is already running.
    ///
    /// The file is opened with create+read+write (no truncate) so creation
    /// and locking cannot race.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let lock_path = path.as_ref();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            DynfwError::AlreadyRunning(format!(
                "another dynfw daemon holds {}. \
                 If you believe this is an error, remove the lock file.",
                lock_path.display()
            ))
        })?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dynfw.lock");

        let guard = LockGuard::acquire(&path).unwrap();
        let second = LockGuard::acquire(&path);
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("Already running"));

        drop(guard);
        assert!(LockGuard::acquire(&path).is_ok());
    }

    #[test]
    fn test_lock_file_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run").join("dynfw.lock");

        let _guard = LockGuard::acquire(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
