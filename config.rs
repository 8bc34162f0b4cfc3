use crate::constraint::Constraint;
use crate::error::{Error, Result};
use crate::models::MediaType;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MEDIA_CATALOG_CONFIG";
pub const DATABASE_ENV: &str = "MEDIA_CATALOG_DB";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Used when a session token cannot be restored.
    #[serde(default = "default_constraint")]
    pub default_constraint: Constraint,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            default_constraint: default_constraint(),
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs_next::data_dir()
        .map(|dir| dir.join("MediaCatalog").join("library.db"))
        .unwrap_or_else(|| PathBuf::from("library.db"))
}

fn default_pool_size() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_constraint() -> Constraint {
    Constraint {
        types: vec![MediaType::Still],
        ..Default::default()
    }
}

impl CatalogConfig {
    /// Reads the file named by `MEDIA_CATALOG_CONFIG` (or defaults), then
    /// applies the `MEDIA_CATALOG_DB` override.
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(path) = env::var_os(DATABASE_ENV) {
            config.database_path = PathBuf::from(path);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path is empty".into()));
        }
        Ok(())
    }
}
