//! End-to-end runs of the guarded rewrite/build/restore workflow

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use ue_retarget::backup::backup_path;
use ue_retarget::workflow::EXIT_RESTORE;
use ue_retarget::{
    run_guarded, BackupError, ManifestError, RetargetOptions, Separator, SnapshotOutcome,
    StepError, StepOutcome, WorkflowError,
};

const MANIFEST: &str = r#"{
 "TargetName": "MyProj",
 "AdditionalProperties": [
  {
   "Name": "Plugin",
   "Value": "C:\\Users\\dev\\MyProj\\Plugins\\Foo\\Lib.so"
  },
  {
   "Name": "NDK",
   "Value": "C:\\SDKs\\Android\\ndk\\toolchain.cmake"
  }
 ]
}
"#;

fn setup(dir: &Path) -> std::path::PathBuf {
    let target = dir.join("Binaries").join("Android").join("MyProj.target");
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::write(&target, MANIFEST).unwrap();
    target
}

fn options() -> RetargetOptions {
    RetargetOptions::new("/home/ci/build/MyProj").with_separator(Separator::Slash)
}

#[tokio::test]
async fn success_restores_original() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());

    let seen = Arc::new(Mutex::new(String::new()));
    let capture = seen.clone();
    let path = target.clone();

    let report = run_guarded(&target, &options(), ".bak", || async move {
        *capture.lock().unwrap() = fs::read_to_string(&path).unwrap();
        Ok(StepOutcome::Succeeded)
    })
    .await
    .unwrap();

    assert_eq!(report.snapshot, SnapshotOutcome::Created);
    assert_eq!(report.rewrite.changed, 1);
    assert_eq!(report.rewrite.notes.len(), 1);
    assert!(seen
        .lock()
        .unwrap()
        .contains("/home/ci/build/MyProj/Plugins/Foo/Lib.so"));

    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
    assert!(!backup_path(&target, ".bak").exists());
}

#[tokio::test]
async fn failed_step_restores_then_reports_failure() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());

    let err = run_guarded(&target, &options(), ".bak", || async {
        Ok(StepOutcome::Failed { code: Some(6) })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, WorkflowError::ExternalStepFailed { code: Some(6) }));
    assert_eq!(err.exit_code(), 6);
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
    assert!(!backup_path(&target, ".bak").exists());
}

#[tokio::test]
async fn step_error_restores() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());

    let err = run_guarded(&target, &options(), ".bak", || async {
        Err(StepError::TimedOut(std::time::Duration::from_secs(1)))
    })
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 124);
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
}

#[tokio::test]
async fn parse_error_skips_step_and_restores() {
    let temp = tempdir().unwrap();
    let target = temp.path().join("Broken.target");
    fs::write(&target, "not json").unwrap();

    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();

    let err = run_guarded(&target, &options(), ".bak", || async move {
        *flag.lock().unwrap() = true;
        Ok(StepOutcome::Succeeded)
    })
    .await
    .unwrap_err();

    assert!(matches!(err, WorkflowError::Manifest(ManifestError::Parse { .. })));
    assert!(!*ran.lock().unwrap());
    assert_eq!(fs::read_to_string(&target).unwrap(), "not json");
    assert!(!backup_path(&target, ".bak").exists());
}

#[tokio::test]
async fn leftover_backup_is_authoritative() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());
    let backup = backup_path(&target, ".bak");

    // a crashed earlier run left its mutated manifest and the pristine backup
    fs::write(&backup, MANIFEST).unwrap();
    fs::write(&target, MANIFEST.replace("C:\\\\Users\\\\dev", "X:\\\\stale")).unwrap();

    let report = run_guarded(&target, &options(), ".bak", || async {
        Ok(StepOutcome::Succeeded)
    })
    .await
    .unwrap();

    assert_eq!(report.snapshot, SnapshotOutcome::Existing);
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
    assert!(!backup.exists());
}

#[tokio::test]
async fn backup_only_recovers_missing_manifest() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());
    let backup = backup_path(&target, ".bak");
    fs::rename(&target, &backup).unwrap();

    // rewrite fails because the manifest is gone, but restore still brings it back
    let err = run_guarded(&target, &options(), ".bak", || async {
        Ok(StepOutcome::Succeeded)
    })
    .await
    .unwrap_err();

    assert!(matches!(err, WorkflowError::Manifest(ManifestError::NotFound(_))));
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
}

#[tokio::test]
async fn restore_failure_is_surfaced_with_cause() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());
    let backup = backup_path(&target, ".bak");
    let doomed = backup.clone();

    let err = run_guarded(&target, &options(), ".bak", || async move {
        fs::remove_file(&doomed).unwrap();
        Ok(StepOutcome::Failed { code: Some(2) })
    })
    .await
    .unwrap_err();

    match &err {
        WorkflowError::RestoreAfterFailure { cause, restore } => {
            assert!(matches!(**cause, WorkflowError::ExternalStepFailed { code: Some(2) }));
            assert!(matches!(restore, BackupError::RestoreFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_restore_failure());
    assert_eq!(err.exit_code(), EXIT_RESTORE);
}

#[tokio::test]
async fn restore_failure_after_success_is_still_failure() {
    let temp = tempdir().unwrap();
    let target = setup(temp.path());
    let doomed = backup_path(&target, ".bak");

    let err = run_guarded(&target, &options(), ".bak", || async move {
        fs::remove_file(&doomed).unwrap();
        Ok(StepOutcome::Succeeded)
    })
    .await
    .unwrap_err();

    assert!(matches!(err, WorkflowError::Backup(BackupError::RestoreFailed { .. })));
}

#[cfg(unix)]
#[tokio::test]
async fn real_process_step() {
    use ue_retarget::BuildCommand;

    let temp = tempdir().unwrap();
    let target = setup(temp.path());

    let cmd = BuildCommand::new("sh")
        .args(["-c", "grep -q /home/ci/build/MyProj/Plugins Binaries/Android/MyProj.target"])
        .working_dir(temp.path());

    let report = run_guarded(&target, &options(), ".bak", || cmd.run())
        .await
        .unwrap();
    assert_eq!(report.rewrite.changed, 1);
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
}

#[cfg(unix)]
#[tokio::test]
async fn plan_stops_at_failed_step_and_restores() {
    use ue_retarget::{BuildCommand, BuildPlan};

    let temp = tempdir().unwrap();
    let target = setup(temp.path());

    let plan = BuildPlan::new(vec![
        BuildCommand::new("sh")
            .name("package")
            .args([
                "-c",
                "grep -q /home/ci/build/MyProj/Plugins Binaries/Android/MyProj.target && touch Binaries/Android/MyProj-arm64.apk",
            ])
            .working_dir(temp.path())
            .expects(["Binaries/Android/MyProj-arm64.apk"]),
        BuildCommand::new("sh")
            .name("install")
            .args(["-c", "exit 2"])
            .working_dir(temp.path()),
        BuildCommand::new("sh")
            .name("launch")
            .args(["-c", "touch launched"])
            .working_dir(temp.path()),
    ]);

    let err = run_guarded(&target, &options(), ".bak", || plan.run())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::ExternalStepFailed { code: Some(2) }));
    assert_eq!(err.exit_code(), 2);
    assert!(!err.is_restore_failure());
    assert!(temp.path().join("Binaries/Android/MyProj-arm64.apk").exists());
    assert!(!temp.path().join("launched").exists());
    assert_eq!(fs::read_to_string(&target).unwrap(), MANIFEST);
}
