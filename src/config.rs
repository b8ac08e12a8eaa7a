// Configuration handling: hook manifests and backend settings
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, HookExecutionError, Result, SnpError};
use crate::file_lock::LockConfig;

/// Default location the pixi bootstrap scripts are served from
pub const DEFAULT_INSTALLER_BASE_URL: &str = "https://pixi.sh/";

/// File name of the hook manifest inside a hook repository
pub const HOOKS_MANIFEST_FILE: &str = ".pre-commit-hooks.yaml";

/// A hook as declared in a repository's `.pre-commit-hooks.yaml`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HookDefinition {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub additional_dependencies: Vec<String>,
    pub language_version: Option<String>,
    #[serde(default)]
    pub require_serial: bool,
    pub pass_filenames: Option<bool>,
}

impl HookDefinition {
    pub fn pass_filenames(&self) -> bool {
        self.pass_filenames.unwrap_or(true)
    }

    fn validate(&self, index: usize, file_path: Option<&Path>) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SnpError::Config(Box::new(ConfigError::MissingField {
                field: format!("hooks[{index}].id"),
                file_path: file_path.map(Path::to_path_buf),
                line: None,
            })));
        }
        if self.entry.trim().is_empty() {
            return Err(SnpError::Config(Box::new(ConfigError::MissingField {
                field: format!("hooks[{index}].entry"),
                file_path: file_path.map(Path::to_path_buf),
                line: None,
            })));
        }
        if shlex::split(&self.entry).is_none() {
            return Err(SnpError::Config(Box::new(ConfigError::InvalidValue {
                message: "entry is not a valid shell-quoted command".to_string(),
                field: format!("hooks[{index}].entry"),
                value: self.entry.clone(),
                expected: "balanced quotes".to_string(),
                file_path: file_path.map(Path::to_path_buf),
                line: None,
            })));
        }
        Ok(())
    }
}

/// The list of hooks a repository provides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookManifest {
    pub hooks: Vec<HookDefinition>,
}

impl HookManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SnpError::Config(Box::new(ConfigError::NotFound {
                path: path.to_path_buf(),
                suggestion: Some(format!(
                    "Create a {HOOKS_MANIFEST_FILE} file in the hook repository root"
                )),
            })));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_with_context(&content, Some(path))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_yaml_with_context(yaml, None)
    }

    fn from_yaml_with_context(yaml: &str, file_path: Option<&Path>) -> Result<Self> {
        let hooks: Vec<HookDefinition> = serde_yaml::from_str(yaml).map_err(|e| {
            let mut config_error = *Box::<ConfigError>::from(e);
            if let ConfigError::InvalidYaml {
                file_path: ref mut path,
                ..
            } = config_error
            {
                *path = file_path.map(Path::to_path_buf);
            }
            SnpError::Config(Box::new(config_error))
        })?;

        for (index, hook) in hooks.iter().enumerate() {
            hook.validate(index, file_path)?;
        }

        Ok(Self { hooks })
    }

    pub fn find(&self, hook_id: &str) -> Result<&HookDefinition> {
        self.hooks.iter().find(|h| h.id == hook_id).ok_or_else(|| {
            SnpError::HookExecution(Box::new(HookExecutionError::HookNotFound {
                hook_id: hook_id.to_string(),
                available: self.hooks.iter().map(|h| h.id.clone()).collect(),
            }))
        })
    }
}

/// Settings for the pixi backend
#[derive(Debug, Clone)]
pub struct PixiConfig {
    /// Base URL the `install.sh` / `install.ps1` scripts are fetched from
    pub installer_base_url: String,
    pub download_timeout: Duration,
    /// Optional limit for every pixi subcommand run during installation
    pub install_step_timeout: Option<Duration>,
    pub lock: LockConfig,
    /// Number of chunks a hook may run at once unless it requires serial execution
    pub target_concurrency: usize,
}

impl Default for PixiConfig {
    fn default() -> Self {
        Self {
            installer_base_url: DEFAULT_INSTALLER_BASE_URL.to_string(),
            download_timeout: Duration::from_secs(60),
            install_step_timeout: None,
            lock: LockConfig::default(),
            target_concurrency: num_cpus::get().max(1),
        }
    }
}

impl PixiConfig {
    /// Defaults overridden by `SNP_PIXI_INSTALLER_URL` and `SNP_NO_CONCURRENCY`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SNP_PIXI_INSTALLER_URL").filter(|u| !u.is_empty()) {
            config.installer_base_url = url;
        }
        if lookup("SNP_NO_CONCURRENCY").is_some() {
            config.target_concurrency = 1;
        }

        config
    }

    pub fn with_installer_base_url(mut self, url: impl Into<String>) -> Self {
        self.installer_base_url = url.into();
        self
    }

    pub fn with_target_concurrency(mut self, jobs: usize) -> Self {
        self.target_concurrency = jobs.max(1);
        self
    }

    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }
}
