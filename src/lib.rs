//! ue-retarget - build-target manifest path retargeting
//!
//! Rewrites machine-specific absolute paths in an Unreal build-target
//! manifest so they point into the current project, runs a build step
//! against the rewritten file, and always restores the original.

pub mod backup;
pub mod config;
pub mod manifest;
pub mod project;
pub mod retarget;
pub mod step;
pub mod workflow;

pub use backup::{BackupError, BackupGuard, SnapshotOutcome};
pub use config::{Config, StepConfig};
pub use manifest::{rewrite_manifest, ManifestError, RewriteReport, UnresolvedPath};
pub use retarget::{
    find_relative_tail, retarget, PathClassifier, PathKind, RetargetOptions, Separator,
    WindowsClassifier,
};
pub use step::{BuildCommand, BuildPlan, StepError, StepOutcome};
pub use workflow::{run_guarded, WorkflowError, WorkflowReport};
