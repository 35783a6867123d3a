//! Snapshot and restore of the manifest around a mutating operation
//!
//! A backup lives next to the target as `<target><suffix>`. There is at most
//! one per target; an existing backup is treated as authoritative and is
//! never overwritten.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Suffix appended to the manifest file name
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to create backup of {target}: {source}")]
    BackupFailed {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to restore {target} from backup: {reason}")]
    RestoreFailed { target: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// What `snapshot` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created,
    /// A backup from an earlier run was already there and was kept.
    Existing,
}

/// `<target><suffix>`
pub fn backup_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy `target` to its backup path unless a backup already exists.
pub fn snapshot(target: &Path, suffix: &str) -> Result<SnapshotOutcome> {
    let backup = backup_path(target, suffix);

    if backup.exists() {
        tracing::info!(
            "Backup {} still exists; not creating a new one",
            backup.display()
        );
        return Ok(SnapshotOutcome::Existing);
    }

    let bytes = fs::read(target).map_err(|source| BackupError::BackupFailed {
        target: target.to_path_buf(),
        source,
    })?;

    if let Err(source) = fs::write(&backup, &bytes) {
        // don't leave a truncated backup behind to be mistaken for a good one
        let _ = fs::remove_file(&backup);
        return Err(BackupError::BackupFailed {
            target: target.to_path_buf(),
            source,
        });
    }

    tracing::info!("Backup created: {}", backup.display());
    Ok(SnapshotOutcome::Created)
}

/// Move the backup back over `target`, discarding whatever is there now.
pub fn restore(target: &Path, suffix: &str) -> Result<()> {
    let backup = backup_path(target, suffix);

    if !backup.is_file() {
        return Err(BackupError::RestoreFailed {
            target: target.to_path_buf(),
            reason: format!("backup {} does not exist", backup.display()),
        });
    }

    if target.exists() {
        fs::remove_file(target).map_err(|e| BackupError::RestoreFailed {
            target: target.to_path_buf(),
            reason: format!("could not remove mutated manifest: {e}"),
        })?;
    }

    tracing::info!("Restoring backup {} -> {}", backup.display(), target.display());
    fs::rename(&backup, target).map_err(|e| BackupError::RestoreFailed {
        target: target.to_path_buf(),
        reason: format!("could not move backup into place: {e}"),
    })?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Snapshotted,
    Restored,
}

/// Scoped snapshot: acquiring takes the backup, and the backup is put back
/// either by an explicit `restore` or when the guard is dropped.
#[derive(Debug)]
pub struct BackupGuard {
    target: PathBuf,
    suffix: String,
    snapshot: SnapshotOutcome,
    state: GuardState,
}

impl BackupGuard {
    pub fn acquire(target: &Path, suffix: &str) -> Result<Self> {
        let snapshot = snapshot(target, suffix)?;
        Ok(Self {
            target: target.to_path_buf(),
            suffix: suffix.to_string(),
            snapshot,
            state: GuardState::Snapshotted,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn snapshot_outcome(&self) -> SnapshotOutcome {
        self.snapshot
    }

    /// Restore now and report the result.
    pub fn restore(mut self) -> Result<()> {
        self.state = GuardState::Restored;
        restore(&self.target, &self.suffix)
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.state == GuardState::Restored {
            return;
        }
        self.state = GuardState::Restored;
        if let Err(e) = restore(&self.target, &self.suffix) {
            tracing::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_appends_suffix() {
        let path = backup_path(Path::new("/a/b/Game.target"), ".bak");
        assert_eq!(path, PathBuf::from("/a/b/Game.target.bak"));
    }

    #[test]
    fn test_snapshot_corrupt_restore_roundtrip() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        let original = b"{\"AdditionalProperties\": []}\r\n\xc3\xa9".to_vec();
        fs::write(&target, &original).unwrap();

        assert_eq!(snapshot(&target, ".bak").unwrap(), SnapshotOutcome::Created);
        fs::write(&target, b"garbage").unwrap();
        restore(&target, ".bak").unwrap();

        assert_eq!(fs::read(&target).unwrap(), original);
        assert!(!backup_path(&target, ".bak").exists());
    }

    #[test]
    fn test_restore_after_target_deleted() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        fs::write(&target, "original").unwrap();

        snapshot(&target, ".bak").unwrap();
        fs::remove_file(&target).unwrap();
        restore(&target, ".bak").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn test_snapshot_keeps_existing_backup() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        let backup = backup_path(&target, ".bak");
        fs::write(&target, "mutated by a crashed run").unwrap();
        fs::write(&backup, "pristine").unwrap();

        assert_eq!(snapshot(&target, ".bak").unwrap(), SnapshotOutcome::Existing);
        assert_eq!(fs::read_to_string(&backup).unwrap(), "pristine");

        restore(&target, ".bak").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "pristine");
    }

    #[test]
    fn test_snapshot_missing_target_fails() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("missing.target");

        let err = snapshot(&target, ".bak").unwrap_err();
        assert!(matches!(err, BackupError::BackupFailed { .. }));
        assert!(!backup_path(&target, ".bak").exists());
    }

    #[test]
    fn test_restore_without_backup_fails() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        fs::write(&target, "mutated").unwrap();

        let err = restore(&target, ".bak").unwrap_err();
        assert!(matches!(err, BackupError::RestoreFailed { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "mutated");
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        fs::write(&target, "original").unwrap();

        {
            let guard = BackupGuard::acquire(&target, ".orig").unwrap();
            assert_eq!(guard.snapshot_outcome(), SnapshotOutcome::Created);
            fs::write(guard.target(), "mutated").unwrap();
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!backup_path(&target, ".orig").exists());
    }

    #[test]
    fn test_guard_explicit_restore_reports_failure() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("Game.target");
        fs::write(&target, "original").unwrap();

        let guard = BackupGuard::acquire(&target, ".bak").unwrap();
        fs::remove_file(backup_path(&target, ".bak")).unwrap();

        let err = guard.restore().unwrap_err();
        assert!(matches!(err, BackupError::RestoreFailed { .. }));
    }
}
