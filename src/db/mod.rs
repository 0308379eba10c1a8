//! Dataset selection and SQLite connection pools.
//!
//! Every request names one of two isolated datasets (`mainPool` or
//! `demoPool`). Each dataset is its own SQLite database behind an r2d2
//! pool; rows never reference across datasets.

use crate::config::{DatabaseConfig, PoolConfig};
use anyhow::{Context, Result};
use r2d2_sqlite::SqliteConnectionManager;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// How long a writer waits on SQLite's lock before failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// How long a request waits for a free pooled connection.
const CONNECTION_TIMEOUT_SECS: u64 = 10;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        displayname TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        accesstoken TEXT NOT NULL UNIQUE
    );";

/// Symbolic dataset selector carried by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Main,
    Demo,
}

/// The selector named neither dataset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid database pool: '{0}'")]
pub struct InvalidPool(pub String);

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Main, Dataset::Demo];

    /// Wire name used in the `dbPool` request field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "mainPool",
            Self::Demo => "demoPool",
        }
    }
}

impl FromStr for Dataset {
    type Err = InvalidPool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainPool" | "main" => Ok(Self::Main),
            "demoPool" | "demo" => Ok(Self::Demo),
            other => Err(InvalidPool(other.to_string())),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection pools for both datasets.
#[derive(Clone)]
pub struct DatabasePools {
    main: SqlitePool,
    demo: SqlitePool,
}

impl DatabasePools {
    /// Open (or create) both dataset databases and bootstrap their schema.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let main = open_pool(&config.main.resolved_path()?, &config.main)
            .context("Failed to open main dataset")?;
        let demo = open_pool(&config.demo.resolved_path()?, &config.demo)
            .context("Failed to open demo dataset")?;
        Ok(Self { main, demo })
    }

    pub fn get(&self, dataset: Dataset) -> &SqlitePool {
        match dataset {
            Dataset::Main => &self.main,
            Dataset::Demo => &self.demo,
        }
    }

    /// Resolve a selector string straight to its pool.
    pub fn select(&self, selector: &str) -> Result<&SqlitePool, InvalidPool> {
        Ok(self.get(selector.parse()?))
    }
}

fn open_pool(path: &Path, config: &PoolConfig) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
    });

    let pool = r2d2::Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .build(manager)
        .with_context(|| format!("Failed to build pool for {}", path.display()))?;

    pool.get()?.execute_batch(SCHEMA)?;

    tracing::debug!(path = %path.display(), max = config.max_connections, "Opened SQLite pool");
    Ok(pool)
}
