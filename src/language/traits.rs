// Contract between the hook orchestrator and a language backend

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::envcontext::EnvPatch;
use crate::error::{HookExecutionError, Result, SnpError};
use crate::prefix::Prefix;

use super::version::ToolchainVersion;

/// A language backend: provisions an isolated toolchain for a hook
/// repository and runs hook commands inside it.
///
/// Installation and execution are separate phases. `run_hook` never installs;
/// callers are expected to check `health_check` and call
/// `install_environment` first.
#[async_trait]
pub trait Language: Send + Sync {
    fn language_name(&self) -> &str;

    /// Name prefix of the per-version environment directory
    fn environment_dir(&self) -> &str;

    /// Version used when a hook does not declare `language_version`
    fn default_version(&self) -> ToolchainVersion;

    /// Variables that make the environment at `env_dir` visible to children
    fn env_patch(&self, env_dir: &Path, version: &ToolchainVersion) -> EnvPatch;

    /// `None` when the environment is usable, otherwise the reason it is not
    async fn health_check(&self, prefix: &Prefix, version: &ToolchainVersion) -> Option<String>;

    async fn install_environment(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
        additional_dependencies: &[String],
    ) -> Result<()>;

    async fn run_hook(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
        request: &HookRunRequest,
    ) -> Result<HookOutput>;
}

/// Everything needed to run one hook over a set of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookRunRequest {
    pub entry: String,
    pub args: Vec<String>,
    pub file_args: Vec<String>,
    /// Hook is declared against the project in the current directory
    pub is_local: bool,
    pub require_serial: bool,
}

impl HookRunRequest {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_files(mut self, file_args: Vec<String>) -> Self {
        self.file_args = file_args;
        self
    }

    pub fn local(mut self, is_local: bool) -> Self {
        self.is_local = is_local;
        self
    }

    pub fn serial(mut self, require_serial: bool) -> Self {
        self.require_serial = require_serial;
        self
    }
}

/// Aggregate result of every chunk of a hook run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    pub command: String,
    pub exit_code: i32,
    /// Captured stdout and stderr of all chunks, in chunk order
    pub output: Vec<u8>,
    pub files: Vec<PathBuf>,
}

impl HookOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Turn a non-zero exit into `HookExecutionError::NonZeroExit`
    pub fn into_result(self, hook_id: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(SnpError::HookExecution(Box::new(
            HookExecutionError::NonZeroExit {
                hook_id: hook_id.to_string(),
                command: self.command.clone(),
                exit_code: self.exit_code,
                output: self.output_lossy(),
                files_processed: self.files,
            },
        )))
    }
}
