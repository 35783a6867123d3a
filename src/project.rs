//! Unreal project discovery
//!
//! Finds the `.uproject` in a project root and derives the build-target
//! manifest path from it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;

pub const DEFAULT_PLATFORM: &str = "Android";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No .uproject file found in project root: {0}")]
    NoProjectFile(PathBuf),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Invalid project file name: {0}")]
    InvalidName(PathBuf),
}

pub type Result<T> = std::result::Result<T, ProjectError>;

/// First `*.uproject` in `root`, by file name
pub fn find_uproject(root: &Path) -> Result<PathBuf> {
    let pattern = Pattern::new("*.uproject")?;

    let mut candidates: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| pattern.matches(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();

    candidates.sort();
    if candidates.len() > 1 {
        tracing::warn!(
            "Multiple .uproject files in {}; using {}",
            root.display(),
            candidates[0].display()
        );
    }

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProjectError::NoProjectFile(root.to_path_buf()))
}

/// Project name is the `.uproject` file stem
pub fn project_name(uproject: &Path) -> Result<String> {
    uproject
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProjectError::InvalidName(uproject.to_path_buf()))
}

/// `<root>/Binaries/<platform>/<name>.target`
pub fn default_target_path(root: &Path, name: &str, platform: &str) -> PathBuf {
    root.join("Binaries")
        .join(platform)
        .join(format!("{name}.target"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_uproject() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("readme.md"), "").unwrap();
        fs::write(temp.path().join("Zed.uproject"), "{}").unwrap();
        fs::write(temp.path().join("Alpha.uproject"), "{}").unwrap();
        fs::create_dir(temp.path().join("Dir.uproject")).unwrap();

        let found = find_uproject(temp.path()).unwrap();
        assert_eq!(found, temp.path().join("Alpha.uproject"));
        assert_eq!(project_name(&found).unwrap(), "Alpha");
    }

    #[test]
    fn test_find_uproject_missing() {
        let temp = tempdir().unwrap();
        let err = find_uproject(temp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NoProjectFile(_)));
    }

    #[test]
    fn test_default_target_path() {
        let path = default_target_path(Path::new("/p"), "MyProj", DEFAULT_PLATFORM);
        assert_eq!(path, PathBuf::from("/p/Binaries/Android/MyProj.target"));
    }
}
