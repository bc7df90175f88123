use crate::model::HashAlgorithm;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_CACHE_CAPACITY: usize = 2048;
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 1024 * 1024; // 1MB
pub const MAX_HASH_WORKERS: usize = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Entries kept in the in-memory cache tier before LRU eviction.
    pub cache_capacity: usize,
    /// Fixed hash pool size. Derived from the core count when unset.
    pub hash_workers: Option<usize>,
    pub hash_chunk_size: usize,
    pub hash_algorithm: HashAlgorithm,
    pub cache_db_path: String,
    pub history_db_path: String,
    pub ignore_patterns: Vec<String>,
    pub max_name_length: usize,
    pub max_path_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            hash_workers: None,
            hash_chunk_size: DEFAULT_HASH_CHUNK_SIZE,
            hash_algorithm: HashAlgorithm::Xxh64,
            cache_db_path: "batch_renamer_cache.db".to_string(),
            history_db_path: "batch_renamer_history.db".to_string(),
            ignore_patterns: Vec::new(),
            max_name_length: 255,
            max_path_length: 4096,
        }
    }
}

impl AppConfig {
    /// Pool size for hashing: `min(2 × logical cores, 8)` unless configured.
    pub fn hash_worker_count(&self) -> usize {
        match self.hash_workers {
            Some(n) if n > 0 => n,
            _ => default_worker_count(num_cpus::get()),
        }
    }

    pub fn name_limits(&self) -> crate::rename::NameLimits {
        crate::rename::NameLimits {
            max_name_length: self.max_name_length,
            max_path_length: self.max_path_length,
        }
    }
}

pub fn default_worker_count(logical_cores: usize) -> usize {
    (logical_cores.max(1) * 2).min(MAX_HASH_WORKERS)
}

/// Load `Config.toml` (optional) with `BATCH_RENAMER_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("BATCH_RENAMER").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
