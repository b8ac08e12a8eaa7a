// Helpers shared by language backends: environment directory naming,
// executable lookup and hook command composition

use std::path::{Path, PathBuf};

use crate::envcontext::ProcessEnvironment;
use crate::error::{ConfigError, Result, SnpError};
use crate::prefix::Prefix;

use super::version::ToolchainVersion;

/// `<prefix>/<env_dir_name>-<version>`
pub fn environment_dir(prefix: &Prefix, env_dir_name: &str, version: &ToolchainVersion) -> PathBuf {
    prefix.path([format!("{env_dir_name}-{version}")])
}

/// Locate `name` on the `PATH` of `env`
pub fn find_executable(name: &str, env: &ProcessEnvironment) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(name, env.get("PATH"), cwd).ok()
}

/// Platform file name of an executable inside a `bin` directory
pub fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Split a hook entry with shell quoting rules and append its static args
pub fn hook_cmd(entry: &str, args: &[String]) -> Result<Vec<String>> {
    let mut cmd = shlex::split(entry).ok_or_else(|| {
        SnpError::Config(Box::new(ConfigError::InvalidValue {
            message: "entry is not a valid shell-quoted command".to_string(),
            field: "entry".to_string(),
            value: entry.to_string(),
            expected: "balanced quotes".to_string(),
            file_path: None,
            line: None,
        }))
    })?;
    cmd.extend(args.iter().cloned());
    Ok(cmd)
}

/// Reasons an installed environment directory cannot be used
pub fn basic_health_check(env_dir: &Path) -> Option<String> {
    if !env_dir.is_dir() {
        return Some(format!(
            "Environment directory {} does not exist",
            env_dir.display()
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_dir() {
        let prefix = Prefix::new("/hooks/repo");
        assert_eq!(
            environment_dir(&prefix, "pixi_env", &ToolchainVersion::Default),
            PathBuf::from("/hooks/repo/pixi_env-default")
        );
        assert_eq!(
            environment_dir(&prefix, "pixi_env", &ToolchainVersion::parse("v0.37.0")),
            PathBuf::from("/hooks/repo/pixi_env-v0.37.0")
        );
    }

    #[test]
    fn test_hook_cmd_respects_quoting() {
        let cmd = hook_cmd(
            r#"python -c "import sys; print(sys.version)""#,
            &["--verbose".to_string()],
        )
        .unwrap();
        assert_eq!(
            cmd,
            vec!["python", "-c", "import sys; print(sys.version)", "--verbose"]
        );
    }

    #[test]
    fn test_hook_cmd_unbalanced_quotes() {
        assert!(hook_cmd("echo 'oops", &[]).is_err());
    }

    #[test]
    fn test_basic_health_check() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(basic_health_check(temp_dir.path()).is_none());
        assert!(basic_health_check(&temp_dir.path().join("missing")).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_uses_given_path() {
        let env = ProcessEnvironment::from_vars([("PATH", "/definitely/not/here")]);
        assert!(find_executable("sh", &env).is_none());

        let system = ProcessEnvironment::inherit_system();
        assert!(find_executable("sh", &system).is_some());
    }
}
