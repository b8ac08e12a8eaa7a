// Language backends: toolchain provisioning and hook execution

pub mod base;
pub mod environment;
pub mod pixi;
pub mod traits;
pub mod version;

pub use environment::{EnvironmentInstance, InstallState};
pub use pixi::{
    get_env_patch, HookInvocation, HttpInstallerSource, InstallerScript, InstallerSource,
    PixiLanguagePlugin,
};
pub use traits::{HookOutput, HookRunRequest, Language};
pub use version::{DefaultVersionResolver, ToolchainVersion};
