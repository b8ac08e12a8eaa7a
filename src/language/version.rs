// Toolchain version selection for the pixi backend

use once_cell::sync::OnceCell;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::envcontext::ProcessEnvironment;

use super::base;

/// Which pixi build a hook environment uses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolchainVersion {
    /// Whatever `pixi` is already on the search path; no isolation
    System,
    /// Newest release, decided once at install time
    Default,
    /// An explicit release tag such as `v0.37.0`
    Pinned(String),
}

impl ToolchainVersion {
    pub fn parse(version: &str) -> Self {
        match version.trim() {
            "system" => Self::System,
            "" | "default" => Self::Default,
            tag => Self::Pinned(tag.to_string()),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    /// Value handed to the bootstrap script as `PIXI_VERSION`
    pub fn package_manager_version(&self) -> &str {
        match self {
            Self::System => "system",
            Self::Default => "latest",
            Self::Pinned(tag) => tag,
        }
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Default => f.write_str("default"),
            Self::Pinned(tag) => f.write_str(tag),
        }
    }
}

impl FromStr for ToolchainVersion {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

type ProbeFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Decides between `System` and `Default` exactly once per instance
pub struct DefaultVersionResolver {
    probe: ProbeFn,
    resolved: OnceCell<ToolchainVersion>,
}

impl DefaultVersionResolver {
    /// Probe for `pixi` on the `PATH` of `env`
    pub fn for_environment(env: ProcessEnvironment) -> Self {
        Self::with_probe(move || base::find_executable(super::pixi::PIXI_EXECUTABLE, &env).is_some())
    }

    pub fn with_probe<F>(probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            probe: Box::new(probe),
            resolved: OnceCell::new(),
        }
    }

    pub fn resolve_default(&self) -> ToolchainVersion {
        self.resolved
            .get_or_init(|| {
                if (self.probe)() {
                    tracing::debug!("pixi found on PATH, using system installation");
                    ToolchainVersion::System
                } else {
                    tracing::debug!("pixi not found on PATH, an isolated copy will be installed");
                    ToolchainVersion::Default
                }
            })
            .clone()
    }
}

impl fmt::Debug for DefaultVersionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultVersionResolver")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}
