// Advisory file locks guarding environment directories.
// Installation takes the lock exclusively; hook runs share it.

use crate::error::{LockError, Result, SnpError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use fs2::FileExt;

/// Lock types and modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Shared,    // Multiple readers
    Exclusive, // Single writer
}

/// Lock configuration
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            // pixi installs can take minutes
            timeout: Duration::from_secs(600),
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// File lock handle, released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    lock_type: LockType,
    acquired_at: SystemTime,
    file: fs::File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release lock {}: {e}", self.path.display());
        } else {
            tracing::debug!("Released {:?} lock: {}", self.lock_type, self.path.display());
        }
    }
}

impl FileLock {
    /// Acquire a lock on `path`, polling until `config.timeout` elapses
    pub async fn acquire(path: &Path, lock_type: LockType, config: &LockConfig) -> Result<Self> {
        let start_time = Instant::now();

        loop {
            match Self::try_acquire(path, lock_type)? {
                Some(lock) => return Ok(lock),
                None if start_time.elapsed() < config.timeout => {
                    tracing::debug!("Waiting for {:?} lock: {}", lock_type, path.display());
                    tokio::time::sleep(config.retry_interval).await;
                }
                None => {
                    return Err(SnpError::Lock(Box::new(LockError::Timeout {
                        path: path.to_path_buf(),
                        timeout: config.timeout,
                        lock_type,
                    })));
                }
            }
        }
    }

    /// Single non-blocking attempt; `Ok(None)` when the lock is held elsewhere
    pub fn try_acquire(path: &Path, lock_type: LockType) -> Result<Option<Self>> {
        let acquisition_failed = |e: std::io::Error| {
            SnpError::Lock(Box::new(LockError::AcquisitionFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
                lock_type,
            }))
        };

        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(acquisition_failed)?;

        let attempt = match lock_type {
            LockType::Exclusive => file.try_lock_exclusive(),
            LockType::Shared => FileExt::try_lock_shared(&file),
        };

        match attempt {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => return Ok(None),
            Err(e) => return Err(acquisition_failed(e)),
        }

        if lock_type == LockType::Exclusive {
            let mut file_mut = &file;
            writeln!(file_mut, "PID: {}", std::process::id()).ok();
        }

        tracing::debug!("Acquired {:?} lock: {}", lock_type, path.display());

        Ok(Some(Self {
            path: path.to_path_buf(),
            lock_type,
            acquired_at: SystemTime::now(),
            file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn duration_held(&self) -> Duration {
        self.acquired_at.elapsed().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shared_locks_coexist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");

        let first = FileLock::try_acquire(&path, LockType::Shared).unwrap();
        let second = FileLock::try_acquire(&path, LockType::Shared).unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
    }

    #[test]
    fn test_exclusive_blocks_shared() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");

        let exclusive = FileLock::try_acquire(&path, LockType::Exclusive)
            .unwrap()
            .unwrap();
        assert_eq!(exclusive.lock_type(), LockType::Exclusive);
        assert!(FileLock::try_acquire(&path, LockType::Shared)
            .unwrap()
            .is_none());

        drop(exclusive);
        assert!(FileLock::try_acquire(&path, LockType::Shared)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".lock");
        let _held = FileLock::try_acquire(&path, LockType::Exclusive)
            .unwrap()
            .unwrap();

        let config = LockConfig {
            timeout: Duration::from_millis(200),
            retry_interval: Duration::from_millis(20),
        };
        let err = FileLock::acquire(&path, LockType::Exclusive, &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SnpError::Lock(ref e) if matches!(e.as_ref(), LockError::Timeout { .. })
        ));
    }
}
