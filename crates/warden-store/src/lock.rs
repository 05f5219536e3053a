//! Exclusive file locks with a polling timeout.
//!
//! Concurrency in this tool comes from parallel CLI invocations, not
//! threads; each shared document has a sibling `.lock` file and writers
//! hold it for the whole read-modify-write.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

use warden_core::WorkflowError;

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const LOCK_POLL: Duration = Duration::from_millis(50);

/// Held lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`, creating the file if needed.
    /// Fails with a clear error after `timeout`; the caller aborts.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, WorkflowError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(_) if Instant::now() < deadline => std::thread::sleep(LOCK_POLL),
                Err(_) => {
                    return Err(WorkflowError::general(format!(
                        "timed out after {}s waiting for lock {}",
                        timeout.as_secs(),
                        path.display()
                    )))
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
