//! Filesystem lock keyed on the target address, so two sweeps cannot
//! fight over one adapter. `create_new` gives the O_EXCL guarantee.

use crate::orchestrator::error::{SweepError, SweepResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct AdapterLock {
    path: PathBuf,
}

impl AdapterLock {
    pub fn acquire(dir: &Path, key: &str) -> SweepResult<Self> {
        let path = dir.join(format!("ringbench_{}.lock", sanitize(key)));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "adapter lock acquired");
                Ok(Self { path })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Err(
                SweepError::LockContention(path.display().to_string()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AdapterLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to remove adapter lock");
        }
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdapterLock::acquire(dir.path(), "AA:BB:CC:DD:EE:FF").unwrap();
        assert!(lock.path().exists());

        assert!(matches!(
            AdapterLock::acquire(dir.path(), "AA:BB:CC:DD:EE:FF"),
            Err(SweepError::LockContention(_))
        ));
        // A different adapter is unaffected.
        AdapterLock::acquire(dir.path(), "11:22:33:44:55:66").unwrap();

        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
        AdapterLock::acquire(dir.path(), "AA:BB:CC:DD:EE:FF").unwrap();
    }

    #[test]
    fn test_key_sanitized_for_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdapterLock::acquire(dir.path(), "AA:BB/..").unwrap();
        let name = lock.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "ringbench_AA_BB___.lock");
    }
}
