//! Configuration loading for rendergate.
//!
//! Lookup order:
//!
//! 1. An explicit path (`--config`)
//! 2. `$RENDERGATE_CONFIG`
//! 3. `~/.rendergate/config.toml`
//!
//! A missing default file is not an error; built-in defaults apply. Relative
//! directory settings are resolved against the directory of the file they
//! were read from.

mod env;
mod model;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use env::expand_env_vars;
pub use model::{
    ArtifactMode, ArtifactsConfig, DirectivesConfig, EnableConfig, RendergateConfig, RuleConfig,
    RuleSetConfig, ScoreConfig, ServiceConfig, default_true,
};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RENDERGATE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A configuration together with the file it came from, if any.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: RendergateConfig,
}

impl RendergateConfig {
    /// Parse TOML text without touching the filesystem.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: RendergateConfig = toml::from_str(content)?;
        config.expand_env();
        Ok(config)
    }

    /// Read and parse a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.anchor_relative_paths(base);
        }
        Ok(config)
    }

    /// Discover and load the active configuration.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path).map(|config| LoadedConfig {
                path: Some(path.to_path_buf()),
                config,
            });
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            return Self::load_from(&path).map(|config| LoadedConfig {
                path: Some(path),
                config,
            });
        }

        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path).map(|config| LoadedConfig {
                path: Some(path),
                config,
            }),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(LoadedConfig::default())
            }
        }
    }

    /// Default config file location.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".rendergate").join("config.toml"))
    }

    fn expand_env(&mut self) {
        if let Some(url) = self.service.as_mut().and_then(|s| s.url.as_mut()) {
            *url = expand_env_vars(url);
        }
        if let Some(artifacts) = self.artifacts.as_mut() {
            if let Some(base) = artifacts.public_base_url.as_mut() {
                *base = expand_env_vars(base);
            }
            if let Some(dir) = artifacts.dir.as_mut() {
                *dir = expand_path(dir);
            }
        }
        if let Some(dir) = self.directives.as_mut().and_then(|d| d.dir.as_mut()) {
            *dir = expand_path(dir);
        }
    }

    fn anchor_relative_paths(&mut self, base: &Path) {
        let directives = self.directives.get_or_insert_with(Default::default);
        let dir = directives
            .dir
            .take()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DIRECTIVES_DIR));
        directives.dir = Some(anchor(base, dir));

        if let Some(dir) = self.artifacts.as_mut().and_then(|a| a.dir.as_mut()) {
            *dir = anchor(base, std::mem::take(dir));
        }
    }
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(expand_env_vars(s)),
        None => path.to_path_buf(),
    }
}

fn anchor(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path
    } else {
        base.join(path)
    }
}
