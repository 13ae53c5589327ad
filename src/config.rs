//! Config loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity table location.
    pub db_path: PathBuf,
    /// Root holding one directory per active user.
    pub namespace_root: PathBuf,
    /// Root orphaned entries are relocated under.
    pub quarantine_root: PathBuf,
    pub allocation: AllocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: paths::identity_db_path(),
            namespace_root: paths::namespace_root(),
            quarantine_root: paths::quarantine_root(),
            allocation: AllocationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Upper bound on identifier generation and insert retries.
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self { max_attempts: 64 }
    }
}

pub fn config_path() -> PathBuf {
    paths::config_path()
}

/// Load config from the data dir, falling back to defaults when the file
/// is absent. Environment overrides apply last.
pub fn load() -> Result<Config, ConfigError> {
    let path = config_path();
    let mut config = if path.exists() {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn write_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("HS_DB_PATH")
        && !v.trim().is_empty()
    {
        config.db_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("HS_NAMESPACE_ROOT")
        && !v.trim().is_empty()
    {
        config.namespace_root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("HS_QUARANTINE_ROOT")
        && !v.trim().is_empty()
    {
        config.quarantine_root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("HS_ALLOC_MAX_ATTEMPTS")
        && let Ok(n) = v.trim().parse::<u32>()
        && n > 0
    {
        config.allocation.max_attempts = n;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config {
            db_path: PathBuf::from("/srv/homestead/identity.sqlite"),
            namespace_root: PathBuf::from("/srv/homestead/users"),
            quarantine_root: PathBuf::from("/srv/homestead/quarantine"),
            allocation: AllocationConfig { max_attempts: 16 },
        };

        let contents = toml::to_string_pretty(&config).unwrap();
        let reparsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(reparsed.db_path, config.db_path);
        assert_eq!(reparsed.namespace_root, config.namespace_root);
        assert_eq!(reparsed.quarantine_root, config.quarantine_root);
        assert_eq!(reparsed.allocation.max_attempts, 16);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let reparsed: Config = toml::from_str("db_path = \"/tmp/identity.sqlite\"\n").unwrap();
        assert_eq!(reparsed.db_path, PathBuf::from("/tmp/identity.sqlite"));
        assert_eq!(reparsed.allocation.max_attempts, 64);
    }

    #[test]
    fn write_config_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        write_config(&Config::default(), &path).unwrap();
        assert!(path.exists());
    }
}
