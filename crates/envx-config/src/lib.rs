use envx_core::{CoreError, Dataset, RangeTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Full connection URL; wins over the individual parts
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    pub batch_size: Option<usize>,
    /// Write JSON lines here instead of the database
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    pub json: Option<bool>,
}

/// Replacement `[min, max]` for one field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeOverride {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub logging: Option<LoggingConfig>,
    /// dataset -> field -> range
    #[serde(default)]
    pub validation: BTreeMap<String, BTreeMap<String, RangeOverride>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown dataset '{0}' in [validation]")]
    UnknownDataset(String),
    #[error("Invalid range override: {0}")]
    Range(#[from] CoreError),
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

/// Where to connect, after environment overrides
#[derive(Clone, PartialEq)]
pub enum DatabaseTarget {
    Url(String),
    Params {
        host: String,
        port: u16,
        name: String,
        user: String,
        password: Option<String>,
    },
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // May embed credentials
            DatabaseTarget::Url(_) => f.write_str("<DATABASE_URL>"),
            DatabaseTarget::Params {
                host,
                port,
                name,
                user,
                ..
            } => write!(f, "{user}@{host}:{port}/{name}"),
        }
    }
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl AppConfig {
    /// Load configuration from ENVX_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("ENVX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        if Path::new(&path).exists() {
            Self::from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)?;
        let cfg = toml::from_str::<AppConfig>(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every range override against the fixed tables
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.validation.keys() {
            let dataset = key
                .parse::<Dataset>()
                .map_err(|_| ConfigError::UnknownDataset(key.clone()))?;
            self.range_table(dataset)?;
        }
        Ok(())
    }

    /// Range table for `dataset` with any configured overrides applied
    pub fn range_table(&self, dataset: Dataset) -> Result<RangeTable, ConfigError> {
        let mut table = RangeTable::for_dataset(dataset);
        for (key, fields) in &self.validation {
            if key.parse::<Dataset>().ok() != Some(dataset) {
                continue;
            }
            for (field, range) in fields {
                table = table.with_override(field, range.min, range.max)?;
            }
        }
        Ok(table)
    }

    pub fn database_target(&self) -> Result<DatabaseTarget, ConfigError> {
        self.database_target_from(|name| std::env::var(name).ok())
    }

    /// Resolve the connection target: `DATABASE_URL`, then `TIMESCALE_*`
    /// variables over the `[database]` values, then defaults.
    pub fn database_target_from<F>(&self, lookup: F) -> Result<DatabaseTarget, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = self.database.clone().unwrap_or_default();

        if let Some(url) = lookup("DATABASE_URL").or(db.url) {
            return Ok(DatabaseTarget::Url(url));
        }

        let port = match lookup("TIMESCALE_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TIMESCALE_PORT",
                value,
            })?,
            None => db.port.unwrap_or(5432),
        };

        Ok(DatabaseTarget::Params {
            host: lookup("TIMESCALE_HOST")
                .or(db.host)
                .unwrap_or_else(|| "localhost".to_string()),
            port,
            name: lookup("TIMESCALE_DB")
                .or(db.name)
                .unwrap_or_else(|| "weather_db".to_string()),
            user: lookup("TIMESCALE_USER")
                .or(db.user)
                .unwrap_or_else(|| "weather_user".to_string()),
            password: lookup("TIMESCALE_PASSWORD").or(db.password),
        })
    }

    pub fn max_connections(&self) -> u32 {
        self.database
            .as_ref()
            .and_then(|d| d.max_connections)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    /// Rows per INSERT (default 5000)
    pub fn batch_size(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.batch_size)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.pipeline.as_ref().and_then(|p| p.output_dir.as_deref())
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}
