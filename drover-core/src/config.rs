//! Configuration management for Drover
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (DROVER_*)
//! 3. Config file (~/.config/drover/config.toml)
//! 4. Default values

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::git::RetryPolicy;
use crate::{Error, Result};

/// Git invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitConfig {
    /// Path to the git executable
    pub git_path: String,

    /// Default clone depth for shallow clones
    pub depth: u32,

    /// Always clone full history
    pub always_deep: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            git_path: "git".to_string(),
            depth: 1,
            always_deep: false,
        }
    }
}

/// Retry settings for fresh clones
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each failure
    pub factor: u32,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay: policy.initial_delay,
            factor: policy.factor,
            max_delay: policy.max_delay,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            factor: config.factor.max(1),
            max_delay: config.max_delay,
        }
    }
}

/// How working-copy directories are allocated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryStrategy {
    /// A new temporary directory per clone
    #[default]
    Fresh,
    /// Reuse working copies from a per-repository pool
    Pooled,
}

impl std::str::FromStr for DirectoryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(Self::Fresh),
            "pooled" => Ok(Self::Pooled),
            other => Err(Error::Config(format!(
                "Unknown directory strategy '{}'. Expected 'fresh' or 'pooled'",
                other
            ))),
        }
    }
}

/// Working-copy directory settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub strategy: DirectoryStrategy,

    /// Root for pooled or temporary working copies
    pub cache_dir: Option<PathBuf>,

    /// Maximum pooled working copies kept per repository
    pub max_per_repo: usize,

    /// Pooled working copies unused for longer than this are evicted
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            strategy: DirectoryStrategy::Fresh,
            cache_dir: None,
            max_per_repo: 5,
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub git: GitConfig,
    pub retry: RetryConfig,
    pub directories: DirectoryConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Returns `~/.config/drover/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("drover").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - DROVER_GIT_PATH: Path to git executable
    /// - DROVER_DIRECTORY_STRATEGY: `fresh` or `pooled`
    /// - DROVER_CACHE_DIR: Root for working copies
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(git_path) = std::env::var("DROVER_GIT_PATH") {
            self.git.git_path = git_path;
        }

        if let Ok(strategy) = std::env::var("DROVER_DIRECTORY_STRATEGY") {
            self.directories.strategy = strategy.parse()?;
        }

        if let Ok(dir) = std::env::var("DROVER_CACHE_DIR") {
            self.directories.cache_dir = Some(PathBuf::from(dir));
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, git_path: Option<String>, cache_dir: Option<PathBuf>) -> Self {
        if let Some(path) = git_path {
            self.git.git_path = path;
        }

        if let Some(dir) = cache_dir {
            self.directories.cache_dir = Some(dir);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(git_path: Option<String>, cache_dir: Option<PathBuf>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(git_path, cache_dir))
    }

    /// Retry policy described by the `[retry]` section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.git.git_path, "git");
        assert_eq!(config.git.depth, 1);
        assert!(!config.git.always_deep);
        assert_eq!(config.directories.strategy, DirectoryStrategy::Fresh);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_cli_overrides(Some("/opt/git/bin/git".to_string()), Some(PathBuf::from("/srv/wc")));

        assert_eq!(config.git.git_path, "/opt/git/bin/git");
        assert_eq!(config.directories.cache_dir, Some(PathBuf::from("/srv/wc")));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[git]
depth = 5
always_deep = true

[retry]
max_attempts = 2
initial_delay = "250ms"
max_delay = "1s"

[directories]
strategy = "pooled"
max_age = "2days"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.git.depth, 5);
        assert!(config.git.always_deep);
        assert_eq!(config.git.git_path, "git");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.factor, 2);
        assert_eq!(config.retry.max_delay, Duration::from_secs(1));
        assert_eq!(config.directories.strategy, DirectoryStrategy::Pooled);
        assert_eq!(config.directories.max_age, Duration::from_secs(2 * 24 * 3600));
        assert_eq!(config.directories.max_per_repo, 5);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert_eq!(config.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Pooled".parse::<DirectoryStrategy>().unwrap(), DirectoryStrategy::Pooled);
        assert!("lru".parse::<DirectoryStrategy>().is_err());
    }
}
