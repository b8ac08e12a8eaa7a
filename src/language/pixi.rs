// pixi language backend: bootstraps an isolated pixi per hook environment,
// resolves the project's dependencies eagerly at install time and runs hooks
// with `pixi run --frozen`.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PixiConfig;
use crate::envcontext::{EnvPatch, ProcessEnvironment};
use crate::error::{
    DownloadError, HookExecutionError, InstallationError, Result, SnpError,
};
use crate::file_lock::{FileLock, LockType};
use crate::prefix::Prefix;
use crate::process::{ProcessConfig, ProcessManager, ProcessResult};
use crate::xargs::{self, XargsOptions};

use super::base;
use super::environment::{EnvironmentInstance, InstallState};
use super::traits::{HookOutput, HookRunRequest, Language};
use super::version::{DefaultVersionResolver, ToolchainVersion};

pub const LANGUAGE_NAME: &str = "pixi";
pub const ENVIRONMENT_DIR: &str = "pixi_env";
pub const MANIFEST_FILE: &str = "pixi.toml";
pub const PIXI_EXECUTABLE: &str = "pixi";
/// Where pixi materializes a manifest's environments, next to the manifest
pub const PIXI_WORKSPACE_DIR: &str = ".pixi";

/// Bootstrap script flavour, picked from the host platform family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerScript {
    Shell,
    PowerShell,
}

impl InstallerScript {
    pub fn for_host() -> Self {
        Self::for_platform(std::env::consts::OS)
    }

    pub fn for_platform(os: &str) -> Self {
        if os == "windows" {
            Self::PowerShell
        } else {
            Self::Shell
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Shell => "install.sh",
            Self::PowerShell => "install.ps1",
        }
    }

    /// Argument vector that executes the persisted script
    pub fn command(&self, script: &Path) -> Vec<String> {
        let script = script.to_string_lossy().into_owned();
        match self {
            Self::Shell => vec![script],
            Self::PowerShell => vec![
                "powershell".to_string(),
                "-ExecutionPolicy".to_string(),
                "ByPass".to_string(),
                "-File".to_string(),
                script,
            ],
        }
    }
}

/// Where bootstrap scripts come from
#[async_trait]
pub trait InstallerSource: Send + Sync {
    async fn fetch(&self, script: InstallerScript) -> Result<Vec<u8>>;
}

/// Downloads bootstrap scripts from `<base_url>/<script name>`
#[derive(Debug, Clone)]
pub struct HttpInstallerSource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpInstallerSource {
    pub fn new(config: &PixiConfig) -> Result<Self> {
        let mut raw = config.installer_base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|e| {
            SnpError::Download(Box::new(DownloadError::InvalidUrl {
                url: raw.clone(),
                message: e.to_string(),
            }))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .timeout(config.download_timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn script_url(&self, script: InstallerScript) -> Result<Url> {
        self.base_url.join(script.file_name()).map_err(|e| {
            SnpError::Download(Box::new(DownloadError::InvalidUrl {
                url: format!("{}{}", self.base_url, script.file_name()),
                message: e.to_string(),
            }))
        })
    }
}

#[async_trait]
impl InstallerSource for HttpInstallerSource {
    async fn fetch(&self, script: InstallerScript) -> Result<Vec<u8>> {
        let url = self.script_url(script)?;
        debug!("Downloading pixi installer from {url}");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnpError::Download(Box::new(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            })));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Manifest governing a run: the caller's project for local hooks, the
/// hook repository's own otherwise
pub fn resolve_manifest(prefix: &Prefix, is_local: bool, cwd: &Path) -> PathBuf {
    if is_local {
        cwd.join(MANIFEST_FILE)
    } else {
        prefix.path([MANIFEST_FILE])
    }
}

/// Variables that expose the environment's pixi and confine its state.
///
/// Empty for the system installation.
pub fn get_env_patch(env_dir: &Path, version: &ToolchainVersion) -> EnvPatch {
    if version.is_system() {
        return EnvPatch::new();
    }
    EnvPatch::new()
        .prepend_path("PATH", &env_dir.join("bin"))
        .set("PIXI_HOME", env_dir.to_string_lossy())
}

/// Parse `pixi 0.37.0` into the release tag `v0.37.0`
pub fn parse_release(version_output: &str) -> Option<String> {
    let token = version_output.split_whitespace().last()?;
    let number = token.trim_start_matches('v');
    if number.starts_with(|c: char| c.is_ascii_digit()) && number.contains('.') {
        Some(format!("v{number}"))
    } else {
        None
    }
}

/// Final `pixi run` command line, before file arguments are appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    pub manifest_path: PathBuf,
    pub command: Vec<String>,
    pub file_args: Vec<String>,
}

impl HookInvocation {
    pub fn build(prefix: &Prefix, request: &HookRunRequest, cwd: &Path) -> Result<Self> {
        let manifest_path = resolve_manifest(prefix, request.is_local, cwd);

        let mut command = vec![
            PIXI_EXECUTABLE.to_string(),
            "run".to_string(),
            "--manifest-path".to_string(),
            manifest_path.to_string_lossy().into_owned(),
            "--frozen".to_string(),
        ];
        command.extend(base::hook_cmd(&request.entry, &request.args)?);

        Ok(Self {
            manifest_path,
            command,
            file_args: request.file_args.clone(),
        })
    }

    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }

    /// Whether pixi has already installed the manifest's environments
    pub fn manifest_installed(&self) -> bool {
        self.manifest_path
            .parent()
            .is_some_and(|dir| dir.join(PIXI_WORKSPACE_DIR).is_dir())
    }
}

pub struct PixiLanguagePlugin {
    config: PixiConfig,
    base_env: ProcessEnvironment,
    resolver: DefaultVersionResolver,
    installer: Arc<dyn InstallerSource>,
    process_manager: ProcessManager,
}

impl PixiLanguagePlugin {
    /// Backend that downloads bootstrap scripts over HTTPS
    pub fn new(config: PixiConfig) -> Result<Self> {
        let installer = HttpInstallerSource::new(&config)?;
        Ok(Self::with_installer_source(config, Arc::new(installer)))
    }

    pub fn with_installer_source(config: PixiConfig, installer: Arc<dyn InstallerSource>) -> Self {
        let base_env = ProcessEnvironment::inherit_system();
        Self {
            resolver: DefaultVersionResolver::for_environment(base_env.clone()),
            process_manager: ProcessManager::with_config(1, config.install_step_timeout),
            base_env,
            config,
            installer,
        }
    }

    /// Spawn children from `env` instead of the current process environment
    pub fn with_base_environment(mut self, env: ProcessEnvironment) -> Self {
        self.resolver = DefaultVersionResolver::for_environment(env.clone());
        self.base_env = env;
        self
    }

    pub fn with_resolver(mut self, resolver: DefaultVersionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &PixiConfig {
        &self.config
    }

    pub fn environment_instance(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
    ) -> EnvironmentInstance {
        EnvironmentInstance::new(prefix, ENVIRONMENT_DIR, version)
    }

    /// Snapshot of the base environment with the version's patch applied
    pub fn activated_environment(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
    ) -> ProcessEnvironment {
        let instance = self.environment_instance(prefix, version);
        let mut env = self.base_env.clone();
        let active = env.activate(&get_env_patch(instance.dir(), version));
        (*active).clone()
    }

    async fn run_step(
        &self,
        step: &str,
        argv: Vec<String>,
        env: &ProcessEnvironment,
        cwd: &Path,
        env_dir: &Path,
    ) -> Result<ProcessResult> {
        let config = ProcessConfig::from_argv(&argv)
            .with_process_environment(env)
            .with_working_dir(cwd.to_path_buf());
        let command = config.display_command();
        debug!(step, command = %command, "Running install step");

        let result = self.process_manager.execute_async(config).await?;
        if !result.success() {
            return Err(SnpError::Installation(Box::new(
                InstallationError::StepFailed {
                    step: step.to_string(),
                    command,
                    exit_code: result.exit_code(),
                    output: String::from_utf8_lossy(&result.combined_output()).into_owned(),
                    environment_dir: env_dir.to_path_buf(),
                },
            )));
        }
        Ok(result)
    }

    /// Download the bootstrap script and install pixi into `$PIXI_HOME/bin`
    async fn bootstrap(
        &self,
        env: &mut ProcessEnvironment,
        env_dir: &Path,
        release: &str,
    ) -> Result<()> {
        let script = InstallerScript::for_host();
        let bytes = self.installer.fetch(script).await?;

        let tmp_dir = tempfile::TempDir::new()?;
        let script_path = tmp_dir.path().join(script.file_name());
        persist_script(&script_path, &bytes)?;

        info!("Installing pixi {release} into {}", env_dir.display());

        // Only the bootstrap step sees these
        let bootstrap_patch = EnvPatch::new()
            .set("PIXI_HOME", env_dir.to_string_lossy())
            .set("PIXI_VERSION", release)
            .set("PIXI_NO_PATH_UPDATE", "1");
        let bootstrap_env = env.activate(&bootstrap_patch);

        self.run_step(
            "bootstrap",
            script.command(&script_path),
            &bootstrap_env,
            tmp_dir.path(),
            env_dir,
        )
        .await?;
        Ok(())
    }

    async fn query_release(
        &self,
        env: &ProcessEnvironment,
        cwd: &Path,
        env_dir: &Path,
    ) -> Result<String> {
        let result = self
            .run_step(
                "version",
                vec![PIXI_EXECUTABLE.to_string(), "--version".to_string()],
                env,
                cwd,
                env_dir,
            )
            .await?;
        let stdout = result.stdout();
        parse_release(&stdout).ok_or_else(|| {
            SnpError::Installation(Box::new(InstallationError::UnrecognizedVersion {
                output: stdout.trim().to_string(),
            }))
        })
    }

    fn not_ready(instance: &EnvironmentInstance, reason: &str) -> SnpError {
        SnpError::HookExecution(Box::new(HookExecutionError::EnvironmentNotReady {
            language: LANGUAGE_NAME.to_string(),
            path: instance.dir().to_path_buf(),
            suggestion: Some(format!("{reason}; install the environment before running hooks")),
        }))
    }
}

fn persist_script(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_failed = |e: std::io::Error| {
        SnpError::Download(Box::new(DownloadError::PersistFailed {
            path: path.to_path_buf(),
            error: e.to_string(),
        }))
    };

    fs::write(path, bytes).map_err(persist_failed)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).map_err(persist_failed)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).map_err(persist_failed)?;
    }

    Ok(())
}

#[async_trait]
impl Language for PixiLanguagePlugin {
    fn language_name(&self) -> &str {
        LANGUAGE_NAME
    }

    fn environment_dir(&self) -> &str {
        ENVIRONMENT_DIR
    }

    fn default_version(&self) -> ToolchainVersion {
        self.resolver.resolve_default()
    }

    fn env_patch(&self, env_dir: &Path, version: &ToolchainVersion) -> EnvPatch {
        get_env_patch(env_dir, version)
    }

    async fn health_check(&self, prefix: &Prefix, version: &ToolchainVersion) -> Option<String> {
        let instance = self.environment_instance(prefix, version);
        if let Some(reason) = base::basic_health_check(instance.dir()) {
            return Some(reason);
        }

        match instance.install_state() {
            Ok(Some(state)) if state.complete => {}
            Ok(_) => return Some("pixi environment installation is incomplete".to_string()),
            Err(e) => return Some(e.to_string()),
        }

        let executable = instance.executable(PIXI_EXECUTABLE);
        if !version.is_system() && !executable.is_file() {
            return Some(format!("{} is missing", executable.display()));
        }

        None
    }

    async fn install_environment(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
        additional_dependencies: &[String],
    ) -> Result<()> {
        let instance = self.environment_instance(prefix, version);
        let env_dir = instance.dir();
        instance.ensure_created()?;

        let lock = FileLock::acquire(&instance.lock_path(), LockType::Exclusive, &self.config.lock)
            .await?;

        let previous = instance.install_state()?;
        if let Some(state) = &previous {
            if state.satisfies(additional_dependencies) {
                debug!("pixi environment already installed: {}", env_dir.display());
                return Ok(());
            }
        }

        let state_path = instance.state_path();
        let mut state = previous.unwrap_or_else(|| InstallState::new(LANGUAGE_NAME, version));
        state.complete = false;
        state.additional_dependencies = additional_dependencies.to_vec();
        state.save(&state_path)?;

        let mut env = self.base_env.clone();
        let mut active = env.activate(&get_env_patch(env_dir, version));

        if !version.is_system() {
            let installed = instance.executable(PIXI_EXECUTABLE).is_file();
            if let Some(release) = state.resolved_release.as_ref().filter(|_| installed) {
                debug!("Reusing pixi {release} in {}", env_dir.display());
            } else {
                // A partial install keeps the release it already resolved
                let release = state
                    .resolved_release
                    .clone()
                    .unwrap_or_else(|| version.package_manager_version().to_string());
                self.bootstrap(&mut active, env_dir, &release).await?;

                let resolved = self.query_release(&active, env_dir, env_dir).await?;
                if let ToolchainVersion::Pinned(tag) = version {
                    if parse_release(tag).as_deref() != Some(resolved.as_str()) {
                        warn!("Requested pixi {tag} but {resolved} was installed");
                    }
                }
                state.resolved_release = Some(resolved);
                state.save(&state_path)?;
            }
        }

        let project_dir = prefix.prefix_dir();
        let manifest = prefix.path([MANIFEST_FILE]);
        let manifest_arg = manifest.to_string_lossy().into_owned();

        if !manifest.is_file() {
            self.run_step(
                "init",
                vec![PIXI_EXECUTABLE.to_string(), "init".to_string()],
                &active,
                project_dir,
                env_dir,
            )
            .await?;
        }

        if !additional_dependencies.is_empty() {
            let mut argv = vec![
                PIXI_EXECUTABLE.to_string(),
                "add".to_string(),
                "--manifest-path".to_string(),
                manifest_arg.clone(),
            ];
            argv.extend(additional_dependencies.iter().cloned());
            self.run_step("add", argv, &active, project_dir, env_dir)
                .await?;
        }

        // Resolve everything now; a lazy install during concurrent runs
        // corrupts pixi's on-disk state
        self.run_step(
            "install",
            vec![
                PIXI_EXECUTABLE.to_string(),
                "install".to_string(),
                "--manifest-path".to_string(),
                manifest_arg,
                "--all".to_string(),
            ],
            &active,
            project_dir,
            env_dir,
        )
        .await?;

        state.complete = true;
        state.save(&state_path)?;
        info!(
            elapsed = ?lock.duration_held(),
            "pixi environment ready: {}",
            env_dir.display()
        );
        Ok(())
    }

    /// Local hooks run against the caller's manifest, which `install --all`
    /// never touched. Until pixi has installed it, chunks run one at a time so
    /// the lazy install under `--frozen` happens once.
    async fn run_hook(
        &self,
        prefix: &Prefix,
        version: &ToolchainVersion,
        request: &HookRunRequest,
    ) -> Result<HookOutput> {
        let instance = self.environment_instance(prefix, version);
        if !instance.dir().is_dir() {
            return Err(Self::not_ready(&instance, "environment directory is missing"));
        }

        let _lock =
            FileLock::acquire(&instance.lock_path(), LockType::Shared, &self.config.lock).await?;
        match instance.install_state()? {
            Some(state) if state.complete => {}
            _ => return Err(Self::not_ready(&instance, "installation is incomplete")),
        }

        let cwd = std::env::current_dir()?;
        let invocation = HookInvocation::build(prefix, request, &cwd)?;
        debug!(
            manifest = %invocation.manifest_path.display(),
            "Running pixi hook: {}",
            invocation.display_command()
        );

        let jobs = if request.require_serial {
            1
        } else if request.is_local && !invocation.manifest_installed() {
            debug!("Local manifest not installed yet, running chunks serially");
            1
        } else {
            self.config.target_concurrency
        };
        let options = XargsOptions::default().with_jobs(jobs);

        let mut env = self.base_env.clone();
        let active = env.activate(&get_env_patch(instance.dir(), version));
        let (exit_code, output) =
            xargs::run_xargs(&invocation.command, &invocation.file_args, &active, &options)
                .await?;

        Ok(HookOutput {
            command: invocation.display_command(),
            exit_code,
            output,
            files: request.file_args.iter().map(PathBuf::from).collect(),
        })
    }
}
