use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory (under `$HOME`) holding the default config file and databases.
const APP_DIR_NAME: &str = ".repairshop";

/// Config file name inside [`APP_DIR_NAME`].
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub invite: InviteConfig,
}

// ── Gateway ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to make cross-origin requests. Empty = none.
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            allowed_origins: Vec::new(),
        }
    }
}

// ── Database ────────────────────────────────────────────────────────

/// One SQLite database per dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub main: PoolConfig,
    pub demo: PoolConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            main: PoolConfig {
                path: format!("~/{APP_DIR_NAME}/main.db"),
                max_connections: 10,
            },
            demo: PoolConfig {
                path: format!("~/{APP_DIR_NAME}/demo.db"),
                max_connections: 2,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Database file path; `~` and `$VARS` are expanded.
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl PoolConfig {
    /// Path with `~` / environment variables expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.path)
            .with_context(|| format!("Failed to expand database path '{}'", self.path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

// ── Invites ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InviteConfig {
    /// Signup page the invite link points at. The token is appended as
    /// `?token=...`.
    pub base_url: String,
    /// Clear the dataset's invite token after a successful invited signup.
    /// Off by default: a live token keeps admitting signups until the admin
    /// issues a new one.
    pub single_use: bool,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/signup".into(),
            single_use: false,
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

impl Config {
    /// Default config file location: `~/.repairshop/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))?
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from an environment lookup. Takes a lookup function
    /// so tests don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REPAIRSHOP_HOST").filter(|v| !v.trim().is_empty()) {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = lookup("REPAIRSHOP_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid REPAIRSHOP_PORT"),
            }
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.gateway.allowed_origins = parse_origin_list(&origins);
        }
        if let Some(url) = lookup("INVITE_URL").filter(|v| !v.trim().is_empty()) {
            self.invite.base_url = url.trim().to_string();
        }
        if let Some(path) = lookup("REPAIRSHOP_MAIN_DB").filter(|v| !v.trim().is_empty()) {
            self.database.main.path = path;
        }
        if let Some(path) = lookup("REPAIRSHOP_DEMO_DB").filter(|v| !v.trim().is_empty()) {
            self.database.demo.path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, pool) in [("main", &self.database.main), ("demo", &self.database.demo)] {
            if pool.path.trim().is_empty() {
                bail!("database.{name}.path must not be empty");
            }
            if pool.max_connections == 0 {
                bail!("database.{name}.max_connections must be at least 1");
            }
        }
        Ok(())
    }
}

/// Split a comma-separated origin list, trimming entries and dropping blanks.
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
