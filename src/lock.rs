//! Named cross-process lock
//!
//! Host creation, CHAP installation and mapping are check-then-act sequences
//! against the controller. They are serialized by an exclusive `flock(2)` on
//! `<lock_path>/<prefix>-<name>`, which excludes other threads of this
//! process as well as other processes using the same lock directory.

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// A lock identified by name within a lock directory
#[derive(Debug, Clone)]
pub struct NamedLock {
    name: String,
    path: PathBuf,
}

impl NamedLock {
    pub fn new(dir: &Path, prefix: &str, name: &str) -> Self {
        NamedLock {
            name: name.to_string(),
            path: dir.join(format!("{}-{}", prefix, name)),
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(&config.lock_path, &config.lock_prefix, &config.lock_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held
    ///
    /// The lock is released when the returned guard is dropped.
    pub fn acquire(&self) -> DriverResult<NamedLockGuard> {
        let lock_err = |source: std::io::Error| DriverError::Lock {
            name: self.name.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(lock_err)?;
        let flock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| lock_err(errno.into()))?;

        log::debug!("Acquired lock {}", self.name);
        Ok(NamedLockGuard {
            name: self.name.clone(),
            _flock: flock,
        })
    }
}

/// Holds a [`NamedLock`] until dropped
pub struct NamedLockGuard {
    name: String,
    _flock: Flock<File>,
}

impl std::fmt::Debug for NamedLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLockGuard").field("name", &self.name).finish()
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        log::debug!("Released lock {}", self.name);
    }
}
