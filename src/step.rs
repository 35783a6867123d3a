//! External build steps
//!
//! Runs the build/cook/package/install commands that have to see the
//! retargeted manifest. Only exit status and the presence of declared
//! outputs are inspected.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("No build command configured")]
    NotConfigured,

    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Build step timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Expected output not found after build step: {0}")]
    MissingOutput(PathBuf),
}

pub type Result<T> = std::result::Result<T, StepError>;

/// Exit status of a finished step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed { code: Option<i32> },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// A fully rendered command line
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub name: Option<String>,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Files that must exist once the command succeeds; relative paths resolve against `working_dir`
    pub expects: Vec<String>,
}

impl BuildCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            expects: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn expects<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expects.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace `{name}` placeholders in program and arguments.
    pub fn render(mut self, vars: &HashMap<&str, String>) -> Self {
        self.program = substitute(&self.program, vars);
        self.args = self.args.iter().map(|a| substitute(a, vars)).collect();
        self.expects = self.expects.iter().map(|e| substitute(e, vars)).collect();
        self
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.program)
    }

    fn resolve_output(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Launch and wait; the child is killed if the timeout fires.
    pub async fn run(&self) -> Result<StepOutcome> {
        tracing::info!("Running build step '{}': {}", self.label(), self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| StepError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let waited = match self.timeout {
            Some(limit) => {
                let result = tokio::time::timeout(limit, child.wait()).await;
                match result {
                    Ok(status) => status,
                    Err(_) => {
                        let _ = child.kill().await;
                        return Err(StepError::TimedOut(limit));
                    }
                }
            }
            None => child.wait().await,
        };

        let status = waited.map_err(|source| StepError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !status.success() {
            tracing::error!("Build step '{}' failed with {}", self.label(), status);
            return Ok(StepOutcome::Failed {
                code: status.code(),
            });
        }

        for expected in &self.expects {
            let path = self.resolve_output(expected);
            if !path.exists() {
                return Err(StepError::MissingOutput(path));
            }
            tracing::info!("Output: {}", path.display());
        }

        tracing::info!("Build step '{}' succeeded", self.label());
        Ok(StepOutcome::Succeeded)
    }
}

/// Ordered build steps run under one manifest backup; stops at the first failure.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub steps: Vec<BuildCommand>,
}

impl BuildPlan {
    pub fn new(steps: Vec<BuildCommand>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(&self) -> Result<StepOutcome> {
        if self.steps.is_empty() {
            return Err(StepError::NotConfigured);
        }

        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!("Step {}/{}", index + 1, self.steps.len());
            let outcome = step.run().await?;
            if !outcome.is_success() {
                return Ok(outcome);
            }
        }

        Ok(StepOutcome::Succeeded)
    }
}

/// Single left-to-right pass; substituted values are never re-scanned and
/// unknown `{name}` tokens are kept as written.
fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}
