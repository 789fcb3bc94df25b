use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vitrine_core::{VitrineError, VitrineResult};

const DEFAULT_CONFIG_NAME: &str = "vitrine.json";

pub const DEFAULT_FLUSH_THRESHOLD: usize = 1_000;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_IMPACT_BATCH_SIZE: usize = 1_500;
pub const DEFAULT_SECTION_SIZE: u16 = 64;
pub const DEFAULT_HIERARCHY_LEVELS: u16 = 9;
pub const DEFAULT_BASELINE_OWNER: &str = "default";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Buffered rows per target before an automatic flush.
    pub flush_threshold: Option<usize>,
    pub lock_timeout_ms: Option<u64>,
}

impl WriteConfig {
    pub fn with_defaults() -> Self {
        Self {
            flush_threshold: Some(DEFAULT_FLUSH_THRESHOLD),
            lock_timeout_ms: Some(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    pub impact_batch_size: Option<usize>,
    /// Tags materialized baselines. Processes sharing one database need distinct owners;
    /// opening a catalog purges only rows left under its own owner.
    pub baseline_owner: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub section_size: Option<u16>,
    pub levels: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VitrineConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub write: Option<WriteConfig>,
    pub query: Option<QueryConfig>,
    pub hierarchy: Option<HierarchyConfig>,
}

/// Resolved tunables shared by every collection of a catalog.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub flush_threshold: usize,
    pub lock_timeout: Duration,
    pub impact_batch_size: usize,
    pub section_size: u16,
    pub hierarchy_levels: u16,
}

impl Limits {
    pub fn from_config(config: &VitrineConfig) -> Self {
        let write = config.write.clone().unwrap_or_else(WriteConfig::with_defaults);
        Self {
            flush_threshold: write
                .flush_threshold
                .unwrap_or(DEFAULT_FLUSH_THRESHOLD)
                .max(1),
            lock_timeout: Duration::from_millis(
                write.lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
            ),
            impact_batch_size: config
                .query
                .as_ref()
                .and_then(|query| query.impact_batch_size)
                .unwrap_or(DEFAULT_IMPACT_BATCH_SIZE)
                .max(1),
            section_size: config
                .hierarchy
                .as_ref()
                .and_then(|hierarchy| hierarchy.section_size)
                .unwrap_or(DEFAULT_SECTION_SIZE),
            hierarchy_levels: config
                .hierarchy
                .as_ref()
                .and_then(|hierarchy| hierarchy.levels)
                .unwrap_or(DEFAULT_HIERARCHY_LEVELS),
        }
    }
}

impl VitrineConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            write: Some(WriteConfig::with_defaults()),
            query: None,
            hierarchy: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> VitrineResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| VitrineError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| VitrineError::storage(format!("read config: {err}")))?;
            let config: VitrineConfig = serde_json::from_str(&raw)
                .map_err(|err| VitrineError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = VitrineConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| VitrineError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| VitrineError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> VitrineResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| "catalog.sqlite".to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(VitrineError::invalid("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } => Some(url.as_str()),
        }
    }

    pub fn limits(&self) -> Limits {
        Limits::from_config(self)
    }

    pub fn baseline_owner(&self) -> &str {
        self.query
            .as_ref()
            .and_then(|query| query.baseline_owner.as_deref())
            .unwrap_or(DEFAULT_BASELINE_OWNER)
    }
}
