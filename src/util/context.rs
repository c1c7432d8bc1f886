//! Global context for Keel operations.
//!
//! Provides centralized access to configuration, paths, and output settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{self, Config};

/// Global context shared by every operation.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Directory the command was run from
    cwd: PathBuf,

    /// Verbose output
    verbose: bool,

    /// Colored output
    color: bool,

    /// Merged global + project configuration
    config: Config,
}

impl GlobalContext {
    /// Create a context for the current directory, loading its configuration.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a context for a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        let global = config::global_config_path();
        let config = config::load_config(global.as_deref(), &config::project_config_path(&cwd));

        GlobalContext {
            cwd,
            verbose: false,
            color: true,
            config,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn use_color(&self) -> bool {
        self.color
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_config_is_loaded() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".keel")).unwrap();
        std::fs::write(
            tmp.path().join(".keel/config.toml"),
            "[validate]\nport = 4321\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf());
        assert_eq!(ctx.config().validate.port(), 4321);
    }

    #[test]
    fn test_resolve_path() {
        let ctx = GlobalContext::with_cwd(PathBuf::from("/work"));
        assert_eq!(ctx.resolve_path(Path::new("app")), PathBuf::from("/work/app"));
        assert_eq!(ctx.resolve_path(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn test_with_config_overrides() {
        let mut config = Config::default();
        config.validate.port = Some(9999);

        let ctx = GlobalContext::with_cwd(PathBuf::from("/work")).with_config(config);
        assert_eq!(ctx.config().validate.port(), 9999);
    }
}
