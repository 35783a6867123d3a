//! Guarded rewrite-then-build workflow
//!
//! `snapshot -> rewrite -> external step -> restore`. Restore runs on every
//! path once the snapshot exists, and the overall result is a success only if
//! both the step and the restore succeeded.

use std::future::Future;
use std::path::Path;

use thiserror::Error;

use crate::backup::{backup_path, BackupError, BackupGuard, SnapshotOutcome};
use crate::manifest::{rewrite_manifest, ManifestError, RewriteReport};
use crate::retarget::RetargetOptions;
use crate::step::{StepError, StepOutcome};

/// Exit codes for the tool's own failures, kept above the low codes build
/// tools return so the two can be told apart. A step's code is passed
/// through unchanged and can still land on one of these.
pub const EXIT_DATA: i32 = 65;
pub const EXIT_NO_INPUT: i32 = 66;
pub const EXIT_CANT_CREATE: i32 = 73;
pub const EXIT_IO: i32 = 74;
pub const EXIT_RESTORE: i32 = 75;
pub const EXIT_CONFIG: i32 = 78;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_LAUNCH: i32 = 127;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("External step failed with exit code {}", display_code(.code))]
    ExternalStepFailed { code: Option<i32> },

    #[error("{cause}; additionally, {restore}")]
    RestoreAfterFailure {
        cause: Box<WorkflowError>,
        restore: BackupError,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none (terminated by signal)".to_string())
}

impl WorkflowError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Manifest(ManifestError::NotFound(_)) => EXIT_NO_INPUT,
            Self::Manifest(ManifestError::Parse { .. }) => EXIT_DATA,
            Self::Manifest(ManifestError::Io { .. }) => EXIT_IO,
            Self::Backup(BackupError::BackupFailed { .. }) => EXIT_CANT_CREATE,
            Self::Backup(BackupError::RestoreFailed { .. }) => EXIT_RESTORE,
            Self::RestoreAfterFailure { .. } => EXIT_RESTORE,
            Self::Step(StepError::TimedOut(_)) => EXIT_TIMEOUT,
            Self::Step(StepError::Spawn { .. }) => EXIT_LAUNCH,
            Self::Step(StepError::NotConfigured) => EXIT_CONFIG,
            Self::Step(StepError::MissingOutput(_)) => EXIT_NO_INPUT,
            Self::ExternalStepFailed { code } => match code {
                Some(c) if *c != 0 => *c,
                _ => 1,
            },
        }
    }

    /// Whether the manifest may have been left mutated on disk
    pub fn is_restore_failure(&self) -> bool {
        matches!(
            self,
            Self::Backup(BackupError::RestoreFailed { .. }) | Self::RestoreAfterFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// What a successful guarded run did
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub snapshot: SnapshotOutcome,
    pub rewrite: RewriteReport,
}

/// Run `step` while the retargeted manifest is in place, then restore it.
pub async fn run_guarded<F, Fut>(
    target: &Path,
    options: &RetargetOptions,
    backup_suffix: &str,
    step: F,
) -> Result<WorkflowReport>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<StepOutcome, StepError>>,
{
    if !target.exists() && !backup_path(target, backup_suffix).exists() {
        return Err(ManifestError::NotFound(target.to_path_buf()).into());
    }

    let guard = BackupGuard::acquire(target, backup_suffix)?;
    let snapshot = guard.snapshot_outcome();

    let outcome = mutate_and_run(target, options, step).await;

    let restored = guard.restore();

    match (outcome, restored) {
        (Ok(rewrite), Ok(())) => Ok(WorkflowReport { snapshot, rewrite }),
        (Err(cause), Ok(())) => Err(cause),
        (Ok(_), Err(restore)) => {
            tracing::error!("Manifest {} may be left modified: {}", target.display(), restore);
            Err(restore.into())
        }
        (Err(cause), Err(restore)) => {
            tracing::error!("Manifest {} may be left modified: {}", target.display(), restore);
            Err(WorkflowError::RestoreAfterFailure {
                cause: Box::new(cause),
                restore,
            })
        }
    }
}

async fn mutate_and_run<F, Fut>(
    target: &Path,
    options: &RetargetOptions,
    step: F,
) -> Result<RewriteReport>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<StepOutcome, StepError>>,
{
    let rewrite = rewrite_manifest(target, options)?;

    match step().await? {
        StepOutcome::Succeeded => Ok(rewrite),
        StepOutcome::Failed { code } => Err(WorkflowError::ExternalStepFailed { code }),
    }
}
