// Logging setup for snp-pixi
use std::io::{self, IsTerminal};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::Result;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format (pretty for terminals, json for programmatic use)
    pub format: LogFormat,
    /// Color output configuration
    pub color: ColorConfig,
    /// Whether to show targets (module names)
    pub show_targets: bool,
}

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Color output configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ColorConfig {
    Auto,
    Always,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            color: ColorConfig::Auto,
            show_targets: false,
        }
    }
}

impl LogConfig {
    /// Create logging configuration from CLI arguments
    pub fn from_cli(verbose: bool, quiet: bool, color: Option<String>) -> Self {
        let level = if quiet {
            Level::ERROR
        } else if verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };

        let color_config = match color.as_deref() {
            Some("always") => ColorConfig::Always,
            Some("never") => ColorConfig::Never,
            _ => ColorConfig::Auto,
        };

        Self {
            level,
            color: color_config,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Check if colors should be used based on configuration and terminal
    pub fn should_use_colors(&self) -> bool {
        match self.color {
            ColorConfig::Always => true,
            ColorConfig::Never => false,
            ColorConfig::Auto => {
                io::stderr().is_terminal()
                    && std::env::var("TERM").map_or(true, |term| term != "dumb")
                    && std::env::var("NO_COLOR").is_err()
            }
        }
    }

    fn env_filter(&self) -> EnvFilter {
        // RUST_LOG wins over the CLI verbosity flags when set
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("snp_pixi={}", self.level)))
    }
}

/// Initialize the logging system with the given configuration.
///
/// Safe to call more than once; later calls are ignored by the global
/// subscriber registry.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = config.env_filter();
    let ansi = config.should_use_colors();

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_target(config.show_targets);

    // try_init so a second initialization (tests, embedding) is not fatal
    let initialized = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = initialized {
        tracing::debug!("Keeping the existing tracing subscriber: {e}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.color, ColorConfig::Auto);
        assert!(!config.show_targets);
    }

    #[test]
    fn test_log_config_from_cli_verbose() {
        let config = LogConfig::from_cli(true, false, None);
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_log_config_from_cli_quiet() {
        let config = LogConfig::from_cli(false, true, None);
        assert_eq!(config.level, Level::ERROR);
    }

    #[test]
    fn test_log_config_color_always_and_never() {
        assert!(LogConfig::from_cli(false, false, Some("always".to_string())).should_use_colors());
        assert!(!LogConfig::from_cli(false, false, Some("never".to_string())).should_use_colors());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LogConfig::default().with_format(LogFormat::Compact);
        assert!(init_logging(config.clone()).is_ok());
        assert!(init_logging(config).is_ok());
    }
}
