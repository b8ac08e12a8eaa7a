// Hook checkout root that language environments are installed under

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root directory of a hook repository checkout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prefix {
    prefix_dir: PathBuf,
}

impl Prefix {
    pub fn new(prefix_dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix_dir: prefix_dir.into(),
        }
    }

    /// Build a prefix from a possibly relative directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        Ok(Self::new(absolute))
    }

    pub fn prefix_dir(&self) -> &Path {
        &self.prefix_dir
    }

    /// Join path components onto the prefix
    pub fn path<I, P>(&self, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self.prefix_dir.clone();
        for part in parts {
            path.push(part);
        }
        path
    }

    pub fn exists<I, P>(&self, parts: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.path(parts).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_joins_components() {
        let prefix = Prefix::new("/repo");
        assert_eq!(
            prefix.path(["pixi_env-default", "bin"]),
            PathBuf::from("/repo/pixi_env-default/bin")
        );
    }

    #[test]
    fn test_relative_prefix_is_made_absolute() {
        let prefix = Prefix::from_dir("some-hook").unwrap();
        assert!(prefix.prefix_dir().is_absolute());
        assert!(prefix.prefix_dir().ends_with("some-hook"));
    }

    #[test]
    fn test_exists() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pixi.toml"), "").unwrap();
        let prefix = Prefix::new(temp_dir.path());
        assert!(prefix.exists(["pixi.toml"]));
        assert!(!prefix.exists(["missing.toml"]));
    }
}
