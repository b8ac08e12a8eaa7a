// CLI interface for the pixi backend using clap
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

use crate::config::{HookManifest, PixiConfig, HOOKS_MANIFEST_FILE};
use crate::error::{exit_codes, CliError, ConfigError, Result, SnpError};
use crate::language::pixi::LANGUAGE_NAME;
use crate::language::{HookRunRequest, Language, PixiLanguagePlugin, ToolchainVersion};
use crate::prefix::Prefix;

#[derive(Parser)]
#[command(
    name = "snp-pixi",
    about = "Provision isolated pixi environments and run hooks inside them",
    version = crate::VERSION,
    long_about = "snp-pixi installs a private copy of pixi per hook repository, resolves the project's dependencies eagerly and runs hook commands with `pixi run --frozen`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Control color output (auto, always, never)
    #[arg(long, global = true, value_name = "WHEN")]
    pub color: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the version used when a hook does not pin one
    DefaultVersion,

    /// Install the pixi environment of a hook repository
    Install {
        /// Hook repository root
        #[arg(long, default_value = ".")]
        prefix: PathBuf,

        /// pixi release to install (`system`, `default` or a tag like v0.37.0)
        #[arg(long)]
        language_version: Option<String>,

        /// Extra dependencies to add to the manifest
        #[arg(long = "additional-dependency", value_name = "DEPENDENCY")]
        additional_dependencies: Vec<String>,
    },

    /// Report whether an installed environment is usable
    HealthCheck {
        /// Hook repository root
        #[arg(long, default_value = ".")]
        prefix: PathBuf,

        #[arg(long)]
        language_version: Option<String>,
    },

    /// Run a hook declared in the repository's hook manifest
    Run {
        /// Hook id from the manifest
        hook: String,

        /// Files to pass to the hook
        files: Vec<String>,

        /// Hook repository root
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Use the pixi.toml of the current directory instead of the repository's
        #[arg(long)]
        local: bool,

        /// Maximum number of parallel chunks
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Generate shell completion scripts
    GenerateCompletion {
        /// Shell to generate completion for
        shell: Shell,
    },
}

impl Cli {
    pub fn run(&self) -> Result<i32> {
        self.init_logging();

        if self.verbose && self.quiet {
            return Err(SnpError::Cli(Box::new(CliError::ConflictingArguments {
                first: "--verbose".to_string(),
                second: "--quiet".to_string(),
                suggestion: "Use either --verbose for more output or --quiet for less output, but not both".to_string(),
            })));
        }

        if let Commands::GenerateCompletion { shell } = &self.command {
            let mut cmd = Self::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            return Ok(exit_codes::SUCCESS);
        }

        let runtime = tokio::runtime::Runtime::new().map_err(|e| {
            SnpError::Cli(Box::new(CliError::RuntimeError {
                message: format!("Failed to start async runtime: {e}"),
            }))
        })?;
        runtime.block_on(self.execute())
    }

    async fn execute(&self) -> Result<i32> {
        let mut config = PixiConfig::from_env();
        if let Commands::Run {
            jobs: Some(jobs), ..
        } = &self.command
        {
            config = config.with_target_concurrency(*jobs);
        }
        let plugin = PixiLanguagePlugin::new(config)?;

        match &self.command {
            Commands::DefaultVersion => {
                println!("{}", plugin.default_version());
                Ok(exit_codes::SUCCESS)
            }
            Commands::Install {
                prefix,
                language_version,
                additional_dependencies,
            } => {
                let prefix = Prefix::from_dir(prefix)?;
                let version = resolve_version(&plugin, language_version.as_deref());
                plugin
                    .install_environment(&prefix, &version, additional_dependencies)
                    .await?;
                if !self.quiet {
                    println!(
                        "Installed pixi environment {}",
                        plugin.environment_instance(&prefix, &version).dir().display()
                    );
                }
                Ok(exit_codes::SUCCESS)
            }
            Commands::HealthCheck {
                prefix,
                language_version,
            } => {
                let prefix = Prefix::from_dir(prefix)?;
                let version = resolve_version(&plugin, language_version.as_deref());
                match plugin.health_check(&prefix, &version).await {
                    None => {
                        println!("healthy");
                        Ok(exit_codes::SUCCESS)
                    }
                    Some(reason) => {
                        println!("unhealthy: {reason}");
                        Ok(exit_codes::GENERAL_ERROR)
                    }
                }
            }
            Commands::Run {
                hook,
                files,
                repo,
                local,
                ..
            } => self.run_hook(&plugin, hook, files, repo, *local).await,
            Commands::GenerateCompletion { .. } => Ok(exit_codes::SUCCESS),
        }
    }

    async fn run_hook(
        &self,
        plugin: &PixiLanguagePlugin,
        hook_id: &str,
        files: &[String],
        repo: &std::path::Path,
        is_local: bool,
    ) -> Result<i32> {
        let prefix = Prefix::from_dir(repo)?;
        let manifest = HookManifest::from_file(&prefix.path([HOOKS_MANIFEST_FILE]))?;
        let hook = manifest.find(hook_id)?;

        if !hook.language.is_empty() && hook.language != LANGUAGE_NAME {
            return Err(SnpError::Config(Box::new(ConfigError::InvalidValue {
                message: format!("hook '{}' is not a pixi hook", hook.id),
                field: "language".to_string(),
                value: hook.language.clone(),
                expected: LANGUAGE_NAME.to_string(),
                file_path: Some(prefix.path([HOOKS_MANIFEST_FILE])),
                line: None,
            })));
        }

        let version = resolve_version(plugin, hook.language_version.as_deref());
        let reinstall_reason = match plugin.health_check(&prefix, &version).await {
            Some(reason) => Some(reason),
            None => match plugin.environment_instance(&prefix, &version).install_state()? {
                Some(state) if state.satisfies(&hook.additional_dependencies) => None,
                _ => Some("additional dependencies changed".to_string()),
            },
        };
        if let Some(reason) = reinstall_reason {
            tracing::info!("Installing environment for {}: {reason}", hook.id);
            plugin
                .install_environment(&prefix, &version, &hook.additional_dependencies)
                .await?;
        }

        let file_args = if hook.pass_filenames() {
            files.to_vec()
        } else {
            Vec::new()
        };
        let request = HookRunRequest::new(hook.entry.clone())
            .with_args(hook.args.clone())
            .with_files(file_args)
            .local(is_local)
            .serial(hook.require_serial);

        let output = plugin.run_hook(&prefix, &version, &request).await?;
        if !self.quiet {
            print!("{}", output.output_lossy());
        }
        if !output.success() {
            tracing::warn!("Hook {} exited with code {}", hook.id, output.exit_code);
        }
        Ok(output.exit_code)
    }

    fn init_logging(&self) {
        use crate::logging::{init_logging, LogConfig};

        let log_config = LogConfig::from_cli(self.verbose, self.quiet, self.color.clone());

        if let Err(e) = init_logging(log_config) {
            eprintln!("Failed to initialize logging: {e}");
        }
    }
}

fn resolve_version(plugin: &PixiLanguagePlugin, requested: Option<&str>) -> ToolchainVersion {
    match requested {
        Some(version) => ToolchainVersion::parse(version),
        None => plugin.default_version(),
    }
}
