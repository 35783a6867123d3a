//! Configuration for ue-retarget
//!
//! Loaded from TOML; every field has a default so a missing file or a
//! partial file is fine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::DEFAULT_BACKUP_SUFFIX;
use crate::project::{self, DEFAULT_PLATFORM};
use crate::retarget::{RetargetOptions, Separator, DEFAULT_ANCHORS};
use crate::step::{BuildCommand, BuildPlan, StepError};

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "ue-retarget.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Project error: {0}")]
    Project(#[from] project::ProjectError),

    #[error("Engine root does not exist: {0}")]
    EngineRootMissing(PathBuf),

    #[error(transparent)]
    Step(#[from] StepError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub retarget: RetargetConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Explicit manifest path; derived from the .uproject when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,

    /// Platform directory under Binaries/
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Unreal Engine install, substituted for `{engine_root}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_root: Option<PathBuf>,
}

/// Separator setting; `native` follows the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparatorSetting {
    #[default]
    Native,
    Slash,
    Backslash,
}

impl SeparatorSetting {
    pub fn resolve(self) -> Separator {
        match self {
            Self::Native => Separator::native(),
            Self::Slash => Separator::Slash,
            Self::Backslash => Separator::Backslash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetargetConfig {
    /// Directory names marking the start of the project-relative tail, in priority order
    #[serde(default = "default_anchors")]
    pub anchors: Vec<String>,

    #[serde(default)]
    pub separator: SeparatorSetting,

    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program to run between rewrite and restore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments; `{configuration}`, `{project}`, `{project_root}`, `{platform}` and `{engine_root}` are substituted
    #[serde(default)]
    pub args: Vec<String>,

    /// Build configuration (Debug, Development, Shipping)
    #[serde(default = "default_configuration")]
    pub configuration: String,

    /// Timeout for the build step in seconds (0 = no timeout)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ordered steps, used when no single `program` is given
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepConfig>,
}

/// One `[[build.steps]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Defaults to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Overrides `[build].timeout_secs` for this step (0 = no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Files the step must produce, e.g. `Binaries/{platform}/{project}-arm64.apk`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log to file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: None,
            target: None,
            platform: default_platform(),
            engine_root: None,
        }
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            anchors: default_anchors(),
            separator: SeparatorSetting::default(),
            backup_suffix: default_backup_suffix(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            configuration: default_configuration(),
            timeout_secs: default_timeout_secs(),
            steps: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}
fn default_anchors() -> Vec<String> {
    DEFAULT_ANCHORS.iter().map(|a| a.to_string()).collect()
}
fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}
fn default_configuration() -> String {
    "Development".to_string()
}
fn default_timeout_secs() -> u64 {
    2 * 60 * 60
} // 2 hours
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `./ue-retarget.toml`, then the user config directory
    pub fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("ue-retarget").join("config.toml"));
        }
        paths
    }

    /// First config that loads from the default locations, else defaults
    pub fn discover() -> Self {
        for path in Self::default_locations() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => return config,
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to load config from {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
        Self::default()
    }

    /// Absolute project root; relative settings resolve against the working directory
    pub fn project_root(&self) -> Result<PathBuf> {
        match &self.project.root {
            Some(root) => Ok(std::path::absolute(root)?),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Explicit target, or `Binaries/<platform>/<project>.target` under the root
    pub fn target_path(&self) -> Result<PathBuf> {
        if let Some(target) = &self.project.target {
            return Ok(target.clone());
        }
        let root = self.project_root()?;
        let name = self.project_name()?;
        Ok(project::default_target_path(&root, &name, &self.project.platform))
    }

    pub fn project_name(&self) -> Result<String> {
        let root = self.project_root()?;
        let uproject = project::find_uproject(&root)?;
        Ok(project::project_name(&uproject)?)
    }

    pub fn retarget_options(&self) -> Result<RetargetOptions> {
        let root = self.project_root()?;
        Ok(RetargetOptions::new(root.to_string_lossy().into_owned())
            .with_anchors(self.retarget.anchors.clone())
            .with_separator(self.retarget.separator.resolve()))
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.build.timeout_secs)
    }

    /// Values for `{name}` placeholders in build commands
    pub fn placeholders(&self, configuration: Option<&str>) -> Result<HashMap<&'static str, String>> {
        let root = self.project_root()?;

        let mut vars = HashMap::new();
        vars.insert(
            "configuration",
            configuration.unwrap_or(self.build.configuration.as_str()).to_string(),
        );
        vars.insert("project_root", root.to_string_lossy().into_owned());
        vars.insert("platform", self.project.platform.clone());
        if let Ok(name) = self.project_name() {
            vars.insert("project", name);
        }
        if let Some(engine) = &self.project.engine_root {
            if !engine.exists() {
                return Err(ConfigError::EngineRootMissing(engine.clone()));
            }
            vars.insert("engine_root", engine.to_string_lossy().into_owned());
        }
        Ok(vars)
    }

    /// Steps for `run`: a trailing command line wins, then `[[build.steps]]`,
    /// then `[build].program`. `timeout_override` of 0 disables the timeout.
    pub fn build_plan(
        &self,
        configuration: Option<&str>,
        timeout_override: Option<u64>,
        trailing: &[String],
    ) -> Result<BuildPlan> {
        let root = self.project_root()?;
        let vars = self.placeholders(configuration)?;
        let default_timeout = match timeout_override {
            Some(secs) => secs_to_timeout(secs),
            None => self.build_timeout(),
        };

        let command = |program: &str, args: &[String]| {
            BuildCommand::new(program)
                .args(args.iter().cloned())
                .working_dir(root.clone())
                .timeout(default_timeout)
        };

        let steps: Vec<BuildCommand> = if let Some((program, args)) = trailing.split_first() {
            vec![command(program.as_str(), args)]
        } else if !self.build.steps.is_empty() {
            self.build
                .steps
                .iter()
                .map(|step| {
                    let mut cmd = command(step.program.as_str(), step.args.as_slice())
                        .expects(step.expects.iter().cloned());
                    if let Some(name) = &step.name {
                        cmd = cmd.name(name.clone());
                    }
                    if let Some(dir) = &step.working_dir {
                        cmd = cmd.working_dir(root.join(dir));
                    }
                    if let (None, Some(secs)) = (timeout_override, step.timeout_secs) {
                        cmd = cmd.timeout(secs_to_timeout(secs));
                    }
                    cmd
                })
                .collect()
        } else if let Some(program) = &self.build.program {
            vec![command(program.as_str(), self.build.args.as_slice())]
        } else {
            return Err(StepError::NotConfigured.into());
        };

        Ok(BuildPlan::new(
            steps.into_iter().map(|step| step.render(&vars)).collect(),
        ))
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
