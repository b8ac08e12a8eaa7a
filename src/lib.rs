// SNP pixi backend - Library module
// Provisions isolated pixi environments for hooks and runs hooks inside them

pub mod cli;
pub mod config;
pub mod envcontext;
pub mod error;
pub mod file_lock;
pub mod language;
pub mod logging;
pub mod prefix;
pub mod process;
pub mod xargs;

// Re-export main types for easier access
pub use config::{HookDefinition, HookManifest, PixiConfig};
pub use envcontext::{EnvGuard, EnvPatch, PatchValue, ProcessEnvironment, ValuePart};
pub use error::{
    exit_codes, CliError, ConfigError, DownloadError, HookExecutionError, InstallationError,
    LockError, ProcessError, Result, SnpError,
};
pub use file_lock::{FileLock, LockConfig, LockType};
pub use language::{
    DefaultVersionResolver, EnvironmentInstance, HookInvocation, HookOutput, HookRunRequest,
    HttpInstallerSource, InstallState, InstallerScript, InstallerSource, Language,
    PixiLanguagePlugin, ToolchainVersion,
};
pub use prefix::Prefix;
pub use process::{ProcessConfig, ProcessManager, ProcessResult};
pub use xargs::{partition, run_xargs, XargsOptions};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(
            parts.len() >= 3,
            "VERSION '{VERSION}' should have at least 3 parts separated by dots (X.Y.Z)"
        );
        for part in parts.iter().take(2) {
            assert!(part.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_name_constant() {
        assert_eq!(NAME, "snp-pixi");
    }

    #[test]
    fn test_description_exists() {
        assert!(DESCRIPTION.contains("pixi"));
    }
}
