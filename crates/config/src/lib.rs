//! Persistence configuration for txscope.
//!
//! This crate provides [`PersistenceConfig`], the declarative list of pools
//! a deployment knows about. By convention the first declared pool is the
//! default one.
//!
//! ```toml
//! [[pool]]
//! name = "accounts"
//! url = "memory://accounts"
//!
//! [[pool]]
//! name = "reporting"
//!
//! [pool.properties]
//! cache = "off"
//! ```
//!
//! Use it as the default pool source of a manager:
//!
//! ```ignore
//! let config = PersistenceConfig::from_path("persistence.toml")?;
//! let manager = TransactionManager::builder()
//!     .default_pool(&config)
//!     .provider(provider)
//!     .build()?;
//! ```

#![warn(missing_docs)]

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use txscope_core::{ConfigError, DefaultPoolSource};

/// One declared pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Logical pool name, used as the transaction schema
    pub name: String,

    /// Backing store identifier; the pool name when absent
    #[serde(default)]
    pub url: Option<String>,

    /// Free-form engine properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl PoolConfig {
    /// Backing store identifier of this pool
    pub fn backing_store(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.name)
    }
}

/// Declared pools, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default, rename = "pool")]
    pools: Vec<PoolConfig>,
}

impl PersistenceConfig {
    /// Load a configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), pools = config.pools.len(), "Loaded persistence configuration");
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: PersistenceConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for pool in &self.pools {
            if pool.name.trim().is_empty() {
                return Err(ConfigError::Parse("empty pool name".to_string()));
            }
            if !seen.insert(pool.name.as_str()) {
                return Err(ConfigError::Parse(format!(
                    "duplicate pool name |{}|",
                    pool.name
                )));
            }
        }
        Ok(())
    }

    /// Declared pools
    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    /// Pool declared under `name`
    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|pool| pool.name == name)
    }

    /// Backing store for `name`; undeclared names map to themselves
    pub fn backing_store<'a>(&'a self, name: &'a str) -> &'a str {
        self.pool(name).map_or(name, PoolConfig::backing_store)
    }
}

impl FromStr for PersistenceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml(s)
    }
}

impl DefaultPoolSource for PersistenceConfig {
    fn default_pool_name(&self) -> Result<String, ConfigError> {
        self.pools
            .first()
            .map(|pool| pool.name.clone())
            .ok_or(ConfigError::MissingPool)
    }
}
