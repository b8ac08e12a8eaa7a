// Error handling framework for the SNP pixi backend
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnpError>;

/// Main error type with the SNP error hierarchy
#[derive(Debug, Error)]
pub enum SnpError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<ConfigError>),

    #[error("Hook execution failed: {0}")]
    HookExecution(#[from] Box<HookExecutionError>),

    #[error("Installer download failed: {0}")]
    Download(#[from] Box<DownloadError>),

    #[error("Environment installation failed: {0}")]
    Installation(#[from] Box<InstallationError>),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("CLI argument error: {0}")]
    Cli(#[from] Box<CliError>),

    #[error("Process execution failed: {0}")]
    Process(#[from] Box<ProcessError>),

    #[error("File locking failed: {0}")]
    Lock(#[from] Box<LockError>),
}

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid YAML syntax: {message}")]
    InvalidYaml {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
        file_path: Option<PathBuf>,
    },

    #[error("Missing required field: {field}")]
    MissingField {
        field: String,
        file_path: Option<PathBuf>,
        line: Option<u32>,
    },

    #[error("Configuration file not found: {path}")]
    NotFound {
        path: PathBuf,
        suggestion: Option<String>,
    },

    #[error("Invalid configuration value: {message}")]
    InvalidValue {
        message: String,
        field: String,
        value: String,
        expected: String,
        file_path: Option<PathBuf>,
        line: Option<u32>,
    },
}

/// Hook execution errors with detailed context
#[derive(Debug, Error)]
pub enum HookExecutionError {
    #[error("Hook failed with exit code {exit_code}: {hook_id}")]
    NonZeroExit {
        hook_id: String,
        command: String,
        exit_code: i32,
        output: String,
        files_processed: Vec<PathBuf>,
    },

    #[error("Environment for {language} is not installed: {path}")]
    EnvironmentNotReady {
        language: String,
        path: PathBuf,
        suggestion: Option<String>,
    },

    #[error("Argument is too long for the platform command line: {argument}")]
    ArgumentTooLong {
        argument: String,
        length: usize,
        max_length: usize,
    },

    #[error("Hook not found: {hook_id}")]
    HookNotFound {
        hook_id: String,
        available: Vec<String>,
    },
}

/// Errors fetching the pixi bootstrap script
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid installer URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Could not persist installer script to {path}: {error}")]
    PersistFailed { path: PathBuf, error: String },
}

/// A named installation step exited unsuccessfully
#[derive(Debug, Error)]
pub enum InstallationError {
    #[error("pixi {step} step failed with exit code {exit_code:?}: {command}")]
    StepFailed {
        step: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
        environment_dir: PathBuf,
    },

    #[error("Could not determine installed pixi version from output: {output}")]
    UnrecognizedVersion { output: String },

    #[error("Install state at {path} is unreadable: {error}")]
    CorruptState { path: PathBuf, error: String },
}

/// CLI argument and command-line interface errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Conflicting arguments: {first} and {second}")]
    ConflictingArguments {
        first: String,
        second: String,
        suggestion: String,
    },

    #[error("Runtime error: {message}")]
    RuntimeError { message: String },
}

/// Process execution errors with detailed context
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Process timeout after {duration:?}: {command}")]
    Timeout {
        command: String,
        duration: std::time::Duration,
    },

    #[error("Command not found: {command}")]
    CommandNotFound {
        command: String,
        suggestion: Option<String>,
    },

    #[error("Process spawn failed: {command}")]
    SpawnFailed { command: String, error: String },

    #[error("Output capture failed: {message}")]
    OutputCaptureFailed { message: String, command: String },

    #[error("Parallel execution failed: {message}")]
    JoinFailed { message: String },
}

/// File locking errors with detailed context
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock acquisition timeout: {path}")]
    Timeout {
        path: PathBuf,
        timeout: std::time::Duration,
        lock_type: crate::file_lock::LockType,
    },

    #[error("Lock acquisition failed: {path}")]
    AcquisitionFailed {
        path: PathBuf,
        error: String,
        lock_type: crate::file_lock::LockType,
    },
}

/// Format errors with colors and context
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Format an error with context and colors
    pub fn format_error(&self, error: &SnpError) -> String {
        use tracing::error;

        match error {
            SnpError::Config(_) => {
                error!(error_type = "config", error = %error, "Configuration error occurred");
            }
            SnpError::HookExecution(_) => {
                error!(error_type = "hook_execution", error = %error, "Hook execution failed");
            }
            SnpError::Download(_) => {
                error!(error_type = "download", error = %error, "Installer download failed");
            }
            SnpError::Installation(_) => {
                error!(error_type = "installation", error = %error, "Environment installation failed");
            }
            SnpError::Cli(_) => {
                error!(error_type = "cli", error = %error, "CLI error occurred");
            }
            SnpError::Process(_) => {
                error!(error_type = "process", error = %error, "Process execution failed");
            }
            SnpError::Lock(_) => {
                error!(error_type = "lock", error = %error, "File locking failed");
            }
            SnpError::Io(_) => {
                error!(error_type = "io", error = %error, "IO operation failed");
            }
        }

        let mut output = String::new();

        if self.use_colors {
            output.push_str("\x1b[31m");
        }
        output.push_str("Error: ");
        if self.use_colors {
            output.push_str("\x1b[0m");
        }

        output.push_str(&error.to_string());

        match error {
            SnpError::Config(config_err) => {
                self.add_config_context(&mut output, config_err.as_ref());
            }
            SnpError::HookExecution(hook_err) => {
                self.add_hook_context(&mut output, hook_err.as_ref());
            }
            SnpError::Installation(install_err) => {
                self.add_installation_context(&mut output, install_err.as_ref());
            }
            SnpError::Cli(cli_err) => {
                if let CliError::ConflictingArguments { suggestion, .. } = cli_err.as_ref() {
                    output.push_str(&format!("\n  Help: {suggestion}"));
                }
            }
            SnpError::Process(process_err) => {
                if let ProcessError::CommandNotFound {
                    suggestion: Some(suggestion),
                    ..
                } = process_err.as_ref()
                {
                    output.push_str(&format!("\n  Help: {suggestion}"));
                }
            }
            SnpError::Lock(lock_err) => {
                if let LockError::Timeout { timeout, .. } = lock_err.as_ref() {
                    output.push_str(&format!("\n  Timeout: {timeout:?}"));
                    output.push_str(
                        "\n  Help: another hook may be installing this environment; try again",
                    );
                }
            }
            _ => {}
        }

        output
    }

    fn add_config_context(&self, output: &mut String, error: &ConfigError) {
        match error {
            ConfigError::InvalidYaml {
                file_path: Some(path),
                line: Some(line),
                ..
            } => {
                output.push_str(&format!("\n  --> {}:{}", path.display(), line));
            }
            ConfigError::NotFound {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            _ => {}
        }
    }

    fn add_hook_context(&self, output: &mut String, error: &HookExecutionError) {
        match error {
            HookExecutionError::NonZeroExit { output: out, .. } if !out.is_empty() => {
                output.push_str(&format!("\n  Hook output: {out}"));
            }
            HookExecutionError::EnvironmentNotReady {
                suggestion: Some(suggestion),
                ..
            } => {
                output.push_str(&format!("\n  Help: {suggestion}"));
            }
            HookExecutionError::HookNotFound { available, .. } if !available.is_empty() => {
                output.push_str(&format!("\n  Available hooks: {}", available.join(", ")));
            }
            _ => {}
        }
    }

    fn add_installation_context(&self, output: &mut String, error: &InstallationError) {
        if let InstallationError::StepFailed {
            output: out,
            environment_dir,
            ..
        } = error
        {
            if !out.is_empty() {
                output.push_str(&format!("\n  Output: {out}"));
            }
            output.push_str(&format!(
                "\n  Partial environment left at {} for inspection",
                environment_dir.display()
            ));
        }
    }
}

/// Exit codes matching pre-commit behavior
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const HOOK_FAILURE: i32 = 4;
    pub const TIMEOUT_ERROR: i32 = 6;
    pub const CLI_ERROR: i32 = 7;
    pub const PROCESS_ERROR: i32 = 9;
    pub const LOCK_ERROR: i32 = 10;
    pub const INSTALL_ERROR: i32 = 11;
}

impl SnpError {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SnpError::Config(_) => exit_codes::CONFIG_ERROR,
            SnpError::HookExecution(hook_err) => match hook_err.as_ref() {
                HookExecutionError::EnvironmentNotReady { .. } => exit_codes::INSTALL_ERROR,
                _ => exit_codes::HOOK_FAILURE,
            },
            SnpError::Download(_) | SnpError::Installation(_) => exit_codes::INSTALL_ERROR,
            SnpError::Cli(_) => exit_codes::CLI_ERROR,
            SnpError::Process(process_err) => match process_err.as_ref() {
                ProcessError::Timeout { .. } => exit_codes::TIMEOUT_ERROR,
                _ => exit_codes::PROCESS_ERROR,
            },
            SnpError::Lock(lock_err) => match lock_err.as_ref() {
                LockError::Timeout { .. } => exit_codes::TIMEOUT_ERROR,
                _ => exit_codes::LOCK_ERROR,
            },
            SnpError::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }

    /// Create a user-friendly error message with context
    pub fn user_message(&self, use_colors: bool) -> String {
        let formatter = ErrorFormatter::new(use_colors);
        formatter.format_error(self)
    }
}

// Conversion from serde_yaml::Error to ConfigError
impl From<serde_yaml::Error> for Box<ConfigError> {
    fn from(error: serde_yaml::Error) -> Self {
        let location = error.location();
        Box::new(ConfigError::InvalidYaml {
            message: error.to_string(),
            line: location.as_ref().map(|l| l.line() as u32),
            column: location.as_ref().map(|l| l.column() as u32),
            file_path: None,
        })
    }
}

// Conversion from reqwest::Error to DownloadError
impl From<reqwest::Error> for Box<DownloadError> {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        match error.status() {
            Some(status) => Box::new(DownloadError::HttpStatus {
                url,
                status: status.as_u16(),
            }),
            None => Box::new(DownloadError::RequestFailed {
                url,
                message: error.to_string(),
            }),
        }
    }
}

impl From<reqwest::Error> for SnpError {
    fn from(error: reqwest::Error) -> Self {
        SnpError::Download(Box::<DownloadError>::from(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SnpError::Installation(Box::new(InstallationError::StepFailed {
            step: "init".to_string(),
            command: "pixi init".to_string(),
            exit_code: Some(1),
            output: String::new(),
            environment_dir: PathBuf::from("/tmp/pixi_env-default"),
        }));
        assert_eq!(
            error.to_string(),
            "Environment installation failed: pixi init step failed with exit code Some(1): pixi init"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let snp_error = SnpError::from(io_error);
        assert!(snp_error.to_string().contains("IO operation failed"));
        assert_eq!(snp_error.exit_code(), exit_codes::GENERAL_ERROR);
    }

    #[test]
    fn test_install_errors_share_exit_code() {
        let download = SnpError::Download(Box::new(DownloadError::HttpStatus {
            url: "https://pixi.sh/install.sh".to_string(),
            status: 404,
        }));
        let not_ready = SnpError::HookExecution(Box::new(
            HookExecutionError::EnvironmentNotReady {
                language: "pixi".to_string(),
                path: PathBuf::from("/tmp/env"),
                suggestion: None,
            },
        ));
        assert_eq!(download.exit_code(), exit_codes::INSTALL_ERROR);
        assert_eq!(not_ready.exit_code(), exit_codes::INSTALL_ERROR);
    }

    #[test]
    fn test_user_message_mentions_partial_environment() {
        let error = SnpError::Installation(Box::new(InstallationError::StepFailed {
            step: "install".to_string(),
            command: "pixi install --all".to_string(),
            exit_code: Some(2),
            output: "solve failed".to_string(),
            environment_dir: PathBuf::from("/tmp/pixi_env-v0.38.0"),
        }));
        let message = error.user_message(false);
        assert!(message.starts_with("Error: "));
        assert!(message.contains("solve failed"));
        assert!(message.contains("/tmp/pixi_env-v0.38.0"));
    }
}
