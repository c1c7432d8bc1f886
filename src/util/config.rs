//! Configuration file support for Keel.
//!
//! Keel supports two configuration file locations:
//! - Global: `~/.keel/config.toml` - User-wide defaults
//! - Project: `.keel/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Every setting is
//! optional; the accessors fall back to the defaults for an npm-based
//! TypeScript backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs::read_to_string;
use crate::util::port::DEFAULT_PORT;

pub const DEFAULT_MANIFEST: &str = "package.json";
pub const DEFAULT_INSTALL_TIMEOUT: u64 = 300;
pub const DEFAULT_BUILD_TIMEOUT: u64 = 120;
pub const DEFAULT_START_SETTLE: u64 = 5;
pub const DEFAULT_TERMINATE_GRACE: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 10;
pub const DEFAULT_SUCCESS_STATUS_BELOW: u16 = 500;
pub const DEFAULT_STDERR_LIMIT: usize = 200;

pub const DEFAULT_CHECK_TIMEOUT: u64 = 60;
pub const DEFAULT_SOURCE_DIR: &str = "src";
pub const DEFAULT_SOURCE_EXTENSION: &str = "ts";
pub const DEFAULT_COMPILER_CONFIG: &str = "tsconfig.json";
pub const DEFAULT_BATCH_PATTERN: &str = "TEST_CASE_*_backend";

/// Keel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime validation settings
    pub validate: ValidateConfig,

    /// Syntactic check settings
    pub check: CheckConfig,
}

/// `[validate]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// Manifest whose presence marks a project root
    pub manifest: Option<String>,

    pub install_command: Option<Vec<String>>,
    pub build_command: Option<Vec<String>>,
    pub start_command: Option<Vec<String>>,

    /// Seconds
    pub install_timeout_secs: Option<u64>,
    pub build_timeout_secs: Option<u64>,
    pub start_settle_secs: Option<u64>,
    pub terminate_grace_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,

    pub port: Option<u16>,
    pub base_url: Option<String>,

    /// Probe responses with a status below this count as success
    pub success_status_below: Option<u16>,

    /// Characters of stderr kept in error messages
    pub stderr_limit: Option<usize>,
}

impl ValidateConfig {
    pub fn manifest(&self) -> &str {
        self.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST)
    }

    pub fn install_command(&self) -> Vec<String> {
        self.install_command
            .clone()
            .unwrap_or_else(|| argv(&["npm", "install"]))
    }

    pub fn build_command(&self) -> Vec<String> {
        self.build_command
            .clone()
            .unwrap_or_else(|| argv(&["npm", "run", "build"]))
    }

    pub fn start_command(&self) -> Vec<String> {
        self.start_command
            .clone()
            .unwrap_or_else(|| argv(&["npm", "run", "start"]))
    }

    pub fn install_timeout(&self) -> Duration {
        secs(self.install_timeout_secs, DEFAULT_INSTALL_TIMEOUT)
    }

    pub fn build_timeout(&self) -> Duration {
        secs(self.build_timeout_secs, DEFAULT_BUILD_TIMEOUT)
    }

    pub fn start_settle(&self) -> Duration {
        secs(self.start_settle_secs, DEFAULT_START_SETTLE)
    }

    pub fn terminate_grace(&self) -> Duration {
        secs(self.terminate_grace_secs, DEFAULT_TERMINATE_GRACE)
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Explicit base URL, or localhost on the configured port.
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port()))
    }

    pub fn success_status_below(&self) -> u16 {
        self.success_status_below
            .unwrap_or(DEFAULT_SUCCESS_STATUS_BELOW)
    }

    pub fn stderr_limit(&self) -> usize {
        self.stderr_limit.unwrap_or(DEFAULT_STDERR_LIMIT)
    }

    fn merge(&mut self, other: ValidateConfig) {
        if other.manifest.is_some() {
            self.manifest = other.manifest;
        }
        if other.install_command.is_some() {
            self.install_command = other.install_command;
        }
        if other.build_command.is_some() {
            self.build_command = other.build_command;
        }
        if other.start_command.is_some() {
            self.start_command = other.start_command;
        }
        if other.install_timeout_secs.is_some() {
            self.install_timeout_secs = other.install_timeout_secs;
        }
        if other.build_timeout_secs.is_some() {
            self.build_timeout_secs = other.build_timeout_secs;
        }
        if other.start_settle_secs.is_some() {
            self.start_settle_secs = other.start_settle_secs;
        }
        if other.terminate_grace_secs.is_some() {
            self.terminate_grace_secs = other.terminate_grace_secs;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.success_status_below.is_some() {
            self.success_status_below = other.success_status_below;
        }
        if other.stderr_limit.is_some() {
            self.stderr_limit = other.stderr_limit;
        }
    }
}

/// `[check]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Compiler invocation, run in the project directory
    pub command: Option<Vec<String>>,

    /// Seconds
    pub timeout_secs: Option<u64>,

    pub source_dir: Option<String>,
    pub source_extension: Option<String>,

    /// Compiler config file required by the structure check
    pub config_file: Option<String>,

    /// Directory glob used by `check-batch`
    pub batch_pattern: Option<String>,
}

impl CheckConfig {
    pub fn command(&self) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| argv(&["npx", "tsc", "--noEmit"]))
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs, DEFAULT_CHECK_TIMEOUT)
    }

    pub fn source_dir(&self) -> &str {
        self.source_dir.as_deref().unwrap_or(DEFAULT_SOURCE_DIR)
    }

    pub fn source_extension(&self) -> &str {
        self.source_extension
            .as_deref()
            .unwrap_or(DEFAULT_SOURCE_EXTENSION)
    }

    pub fn config_file(&self) -> &str {
        self.config_file.as_deref().unwrap_or(DEFAULT_COMPILER_CONFIG)
    }

    pub fn batch_pattern(&self) -> &str {
        self.batch_pattern.as_deref().unwrap_or(DEFAULT_BATCH_PATTERN)
    }

    fn merge(&mut self, other: CheckConfig) {
        if other.command.is_some() {
            self.command = other.command;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.source_dir.is_some() {
            self.source_dir = other.source_dir;
        }
        if other.source_extension.is_some() {
            self.source_extension = other.source_extension;
        }
        if other.config_file.is_some() {
            self.config_file = other.config_file;
        }
        if other.batch_pattern.is_some() {
            self.batch_pattern = other.batch_pattern;
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_to_string(path)?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration, returning default if file doesn't exist or fails to parse.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one. Set values in `other` win.
    pub fn merge(&mut self, other: Config) {
        self.validate.merge(other.validate);
        self.check.merge(other.check);
    }
}

/// Load merged configuration from global and project locations.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    // Project config overrides global
    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global config directory path (~/.keel).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".keel"))
}

/// Get the global config file path (~/.keel/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config file path (.keel/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".keel").join("config.toml")
}
