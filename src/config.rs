use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Dependency choice options.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Prefer any-of choices pulling in the fewest new slots.
    pub minimize_slots: bool,
    /// Combine overlapping any-of groups in disjunctive normal form before choosing.
    pub overlap_dnf: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub atom_cache_size: usize,
    pub reduce_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            atom_cache_size: 10000,
            reduce_cache_size: 1000,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
}

static CURRENT_CONFIG: Lazy<RwLock<Arc<Config>>> = Lazy::new(|| RwLock::new(Default::default()));

impl Config {
    /// Load a config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed loading config {path:?}: {e}")))?;
        data.parse()
    }

    /// Return the process-wide config.
    pub fn current() -> Arc<Config> {
        CURRENT_CONFIG
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the process-wide config.
    ///
    /// Cache sizes only affect caches created afterwards.
    pub fn make_current(config: Config) {
        *CURRENT_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(config);
    }
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        if config.cache.atom_cache_size == 0 || config.cache.reduce_cache_size == 0 {
            return Err(Error::Config("cache sizes must be nonzero".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::macros::assert_err_re;

    use super::*;

    #[test]
    fn test_parse() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());

        let config: Config = r#"
            [resolver]
            minimize_slots = true

            [cache]
            reduce_cache_size = 50
        "#
        .parse()
        .unwrap();
        assert!(config.resolver.minimize_slots);
        assert!(!config.resolver.overlap_dnf);
        assert_eq!(config.cache.reduce_cache_size, 50);
        assert_eq!(config.cache.atom_cache_size, CacheConfig::default().atom_cache_size);

        assert_err_re!("[resolver]\nminimize_slots = 1".parse::<Config>(), "^config error: ");
        assert_err_re!("[cache]\natom_cache_size = 0".parse::<Config>(), "^config error: cache sizes");
    }

    #[test]
    fn test_load() {
        assert_err_re!(Config::load("/nonexistent/pkgdep.toml"), "^config error: failed loading config");

        let dir = tempdir().unwrap();
        let path = dir.path().join("pkgdep.toml");
        fs::write(&path, "[resolver]\noverlap_dnf = true\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.resolver.overlap_dnf);

        fs::write(&path, "[cache]\natom_cache_size = -1\n").unwrap();
        assert_err_re!(Config::load(&path), "^config error: ");
    }

    #[test]
    fn test_current() {
        let config = Config::current();
        assert_eq!(config.cache, CacheConfig::default());
    }
}
