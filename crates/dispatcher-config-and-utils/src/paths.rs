//! File system paths for the dispatcher.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Runtime directory name under the user's home directory.
const BASE_DIR_NAME: &str = ".result-dispatcher";

/// Manages file system paths for the dispatcher.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.result-dispatcher)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.result-dispatcher`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (<base>/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the default build artifacts directory (<base>/builds).
    pub fn builds_dir(&self) -> PathBuf {
        self.base_dir.join("builds")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.builds_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_rooted_at_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/dispatcher"));
        assert_eq!(paths.base_dir(), &PathBuf::from("/tmp/dispatcher"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/dispatcher/config.json")
        );
        assert_eq!(paths.logs_dir(), PathBuf::from("/tmp/dispatcher/logs"));
        assert_eq!(paths.builds_dir(), PathBuf::from("/tmp/dispatcher/builds"));
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
        assert!(paths.builds_dir().is_dir());
    }
}
