// Process management utilities for executing hooks with timeout handling,
// output capture and an explicit child environment

use crate::envcontext::ProcessEnvironment;
use crate::error::{ProcessError, Result, SnpError};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Process execution configuration
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub inherit_env: bool,
    /// Send stdout and stderr through one pipe, preserving write order
    pub merge_output: bool,
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            environment: BTreeMap::new(),
            timeout: None,
            inherit_env: true,
            merge_output: false,
        }
    }

    /// Build a config from a full argument vector (`argv[0]` is the program)
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Self {
        let mut config = Self::new(argv.first().map(|s| s.as_ref()).unwrap_or_default());
        config.args = argv
            .iter()
            .skip(1)
            .map(|s| OsString::from(s.as_ref()))
            .collect();
        config
    }

    pub fn with_args(mut self, args: Vec<impl Into<OsString>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Spawn the child with exactly this environment
    pub fn with_process_environment(mut self, env: &ProcessEnvironment) -> Self {
        self.environment = env.vars().clone();
        self.inherit_env = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_merged_output(mut self) -> Self {
        self.merge_output = true;
        self
    }

    /// Render the command line for logs and error messages
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.command.clone()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn search_path(&self) -> Option<OsString> {
        if self.inherit_env {
            std::env::var_os("PATH")
        } else {
            self.environment.get("PATH").map(OsString::from)
        }
    }

    /// Resolve the program against the child's own `PATH`
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        let command = Path::new(&self.command);
        if command.components().count() > 1 {
            return Ok(command.to_path_buf());
        }

        let cwd = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        which::which_in(&self.command, self.search_path(), cwd).map_err(|_| {
            SnpError::Process(Box::new(ProcessError::CommandNotFound {
                command: self.command.clone(),
                suggestion: Some(format!("Install {} or add it to PATH", self.command)),
            }))
        })
    }
}

/// Process execution result.
///
/// With merged output, `stdout` holds both streams in arrival order and
/// `stderr` is empty.
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    /// Exit code with signals reported as negative numbers
    pub fn return_code(&self) -> i32 {
        if let Some(code) = self.exit_status.code() {
            return code;
        }
        #[cfg(unix)]
        {
            if let Some(signal) = self.exit_status.signal() {
                return -signal;
            }
        }
        -1
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Stdout followed by stderr
    pub fn combined_output(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        out.extend_from_slice(&self.stdout);
        out.extend_from_slice(&self.stderr);
        out
    }
}

/// Main process manager
#[derive(Debug, Clone)]
pub struct ProcessManager {
    max_concurrent: usize,
    default_timeout: Option<Duration>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            max_concurrent: 4,
            default_timeout: None,
        }
    }

    pub fn with_config(max_concurrent: usize, default_timeout: Option<Duration>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            default_timeout,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn execute_async(&self, config: ProcessConfig) -> Result<ProcessResult> {
        use std::process::Stdio;
        use tokio::process::Command;

        let start_time = std::time::Instant::now();
        let program = config.resolve_executable()?;

        tracing::debug!(
            command = %config.display_command(),
            cwd = ?config.working_dir,
            "Spawning process"
        );

        let mut cmd = Command::new(&program);
        cmd.args(&config.args);

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        if !config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(&config.environment);

        let capture_failed = |e: std::io::Error| {
            SnpError::Process(Box::new(ProcessError::OutputCaptureFailed {
                message: format!("Failed to collect process output: {e}"),
                command: config.command.clone(),
            }))
        };

        cmd.stdin(Stdio::null());
        let merged_reader = if config.merge_output {
            let (reader, writer) = std::io::pipe().map_err(capture_failed)?;
            cmd.stdout(writer.try_clone().map_err(capture_failed)?);
            cmd.stderr(writer);
            Some(reader)
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            None
        };
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnpError::Process(Box::new(ProcessError::CommandNotFound {
                    command: config.command.clone(),
                    suggestion: None,
                }))
            } else {
                SnpError::Process(Box::new(ProcessError::SpawnFailed {
                    command: config.command.clone(),
                    error: e.to_string(),
                }))
            }
        })?;
        // The reader only sees EOF once the parent's copies of the write end are closed
        drop(cmd);

        let limit = config.timeout.or(self.default_timeout);
        let output = match merged_reader {
            Some(reader) => with_deadline(limit, &config, collect_merged(child, reader))
                .await?
                .map_err(capture_failed)?,
            None => with_deadline(limit, &config, child.wait_with_output())
                .await?
                .map_err(capture_failed)?,
        };

        Ok(ProcessResult {
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
            duration: start_time.elapsed(),
        })
    }

    /// Run every config, at most `max_concurrent` at a time.
    ///
    /// Results come back in input order.
    pub async fn execute_parallel(
        &self,
        configs: Vec<ProcessConfig>,
    ) -> Vec<Result<ProcessResult>> {
        use tokio::sync::Semaphore;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = Vec::with_capacity(configs.len());

        for config in configs {
            let semaphore = semaphore.clone();
            let manager = ProcessManager::with_config(1, self.default_timeout);
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    SnpError::Process(Box::new(ProcessError::JoinFailed {
                        message: e.to_string(),
                    }))
                })?;
                manager.execute_async(config).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for joined in futures::future::join_all(tasks).await {
            results.push(joined.unwrap_or_else(|join_error| {
                Err(SnpError::Process(Box::new(ProcessError::JoinFailed {
                    message: join_error.to_string(),
                })))
            }));
        }
        results
    }
}

/// Bound `future` by `limit`; dropping it on expiry kills the child (kill_on_drop)
async fn with_deadline<F, T>(
    limit: Option<Duration>,
    config: &ProcessConfig,
    future: F,
) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| {
            SnpError::Process(Box::new(ProcessError::Timeout {
                command: config.display_command(),
                duration: limit,
            }))
        }),
        None => Ok(future.await),
    }
}

async fn collect_merged(
    mut child: tokio::process::Child,
    reader: std::io::PipeReader,
) -> std::io::Result<std::process::Output> {
    let reading = tokio::task::spawn_blocking(move || {
        use std::io::Read;

        let mut reader = reader;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map(|_| buf)
    });

    let status = child.wait().await?;
    let stdout = reading.await.map_err(std::io::Error::other)??;
    Ok(std::process::Output {
        status,
        stdout,
        stderr: Vec::new(),
    })
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
