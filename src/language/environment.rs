// On-disk layout and install bookkeeping of an isolated environment directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{InstallationError, Result, SnpError};
use crate::prefix::Prefix;

use super::base;
use super::version::ToolchainVersion;

pub const INSTALL_STATE_FILE: &str = ".snp-install-state.json";
pub const LOCK_FILE: &str = ".snp-env.lock";

/// Completion marker written by the installer.
///
/// Runs refuse to start until `complete` is set, so a half-installed
/// environment is never used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallState {
    pub language: String,
    pub version: String,
    /// Release the bootstrap actually installed, e.g. `v0.39.0`
    #[serde(default)]
    pub resolved_release: Option<String>,
    #[serde(default)]
    pub additional_dependencies: Vec<String>,
    #[serde(default)]
    pub complete: bool,
    pub updated_at: DateTime<Utc>,
}

impl InstallState {
    pub fn new(language: &str, version: &ToolchainVersion) -> Self {
        Self {
            language: language.to_string(),
            version: version.to_string(),
            resolved_release: None,
            additional_dependencies: Vec::new(),
            complete: false,
            updated_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            SnpError::Installation(Box::new(InstallationError::CorruptState {
                path: path.to_path_buf(),
                error: e.to_string(),
            }))
        })
    }

    /// Write atomically so readers never observe a torn marker
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Utc::now();
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            SnpError::Installation(Box::new(InstallationError::CorruptState {
                path: path.to_path_buf(),
                error: e.to_string(),
            }))
        })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(path).map_err(|e| SnpError::Io(e.error))?;
        Ok(())
    }

    pub fn satisfies(&self, additional_dependencies: &[String]) -> bool {
        self.complete && self.additional_dependencies == additional_dependencies
    }
}

/// Isolated directory keyed by (prefix, version)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInstance {
    dir: PathBuf,
    version: ToolchainVersion,
}

impl EnvironmentInstance {
    pub fn new(prefix: &Prefix, env_dir_name: &str, version: &ToolchainVersion) -> Self {
        Self {
            dir: base::environment_dir(prefix, env_dir_name, version),
            version: version.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn version(&self) -> &ToolchainVersion {
        &self.version
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.join("bin")
    }

    pub fn executable(&self, name: &str) -> PathBuf {
        self.bin_dir().join(base::exe_name(name))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(INSTALL_STATE_FILE)
    }

    pub fn ensure_created(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn install_state(&self) -> Result<Option<InstallState>> {
        InstallState::load(&self.state_path())
    }
}
