use std::path::Path;

use fs4::fs_std::FileExt;

use crate::error::CacheError;

/// An advisory exclusive lock on `<subdir>/.cache/.lock`, held for the
/// lifetime of an embedded-backend [`super::Handle`]. Released automatically
/// on drop (including on panic/early return), per the scheduler's "release
/// on all exit paths" requirement.
pub struct CacheLock {
    file: fs_err::File,
    path: String,
}

impl CacheLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CacheError> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path)?;

        file.try_lock_exclusive().map_err(|_| CacheError::Locked {
            path: lock_path.display().to_string(),
        })?;

        Ok(CacheLock {
            file,
            path: lock_path.display().to_string(),
        })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!("failed to release cache lock {}: {err}", self.path);
        }
    }
}
