//! # Back-office Configuration
//!
//! Settings loaded once at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`SHOPKEEP_*`)
//! 2. Defaults (this file)
//!
//! Configuration is read-only after loading; commands receive it by
//! reference.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Serialize;
use shopkeep_db::DbConfig;
use thiserror::Error;

/// Default tracing filter when neither `SHOPKEEP_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info,shopkeep=debug,sqlx=warn";

const DB_FILE_NAME: &str = "shopkeep.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Could not determine the application data directory; set SHOPKEEP_DB_PATH")]
    NoDataDir,
}

/// Back-office configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackofficeConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    pub max_connections: u32,

    /// `tracing_subscriber::EnvFilter` directives.
    pub log_filter: String,

    /// Store name (shown in CLI output)
    pub store_name: String,

    /// Currency symbol (for display)
    pub currency_symbol: String,

    /// Number of decimal places for currency
    pub currency_decimals: u8,

    /// Actor id recorded as `createdBy` for CLI-initiated writes.
    pub actor: String,
}

impl BackofficeConfig {
    /// Loads configuration from `SHOPKEEP_*` environment variables.
    ///
    /// ## Environment Variables
    /// - `SHOPKEEP_DB_PATH`: database file (default: platform data dir)
    /// - `SHOPKEEP_DB_MAX_CONNECTIONS`: pool size, 1 to 64 (default: 5)
    /// - `SHOPKEEP_LOG`: tracing filter (falls back to `RUST_LOG`)
    /// - `SHOPKEEP_STORE_NAME`, `SHOPKEEP_CURRENCY_SYMBOL`
    /// - `SHOPKEEP_CURRENCY_DECIMALS`: 0 to 4 (default: 2)
    /// - `SHOPKEEP_ACTOR`: default `createdBy` (default: "backoffice")
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = match lookup("SHOPKEEP_DB_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };

        let max_connections = match lookup("SHOPKEEP_DB_MAX_CONNECTIONS") {
            Some(raw) => parse_in_range("SHOPKEEP_DB_MAX_CONNECTIONS", &raw, 1, 64)?,
            None => 5,
        };

        let currency_decimals = match lookup("SHOPKEEP_CURRENCY_DECIMALS") {
            Some(raw) => parse_in_range("SHOPKEEP_CURRENCY_DECIMALS", &raw, 0, 4)? as u8,
            None => 2,
        };

        let log_filter = lookup("SHOPKEEP_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(BackofficeConfig {
            database_path,
            max_connections,
            log_filter,
            store_name: lookup("SHOPKEEP_STORE_NAME").unwrap_or_else(|| "Shopkeep".to_string()),
            currency_symbol: lookup("SHOPKEEP_CURRENCY_SYMBOL").unwrap_or_else(|| "$".to_string()),
            currency_decimals,
            actor: lookup("SHOPKEEP_ACTOR").unwrap_or_else(|| "backoffice".to_string()),
        })
    }

    /// Database settings for [`shopkeep_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }

    /// Formats a cent amount for display.
    ///
    /// ## Examples
    /// - `1234` → `"$12.34"`
    /// - `-600` → `"-$6.00"`
    pub fn format_currency(&self, cents: i64) -> String {
        let divisor = 10_i64.pow(u32::from(self.currency_decimals));
        let whole = (cents / divisor).abs();
        let frac = (cents % divisor).abs();
        let sign = if cents < 0 { "-" } else { "" };

        if self.currency_decimals > 0 {
            format!(
                "{sign}{}{whole}.{frac:0width$}",
                self.currency_symbol,
                width = usize::from(self.currency_decimals)
            )
        } else {
            format!("{sign}{}{whole}", self.currency_symbol)
        }
    }
}

/// Platform data directory.
///
/// - **macOS**: `~/Library/Application Support/com.shopkeep.backoffice/`
/// - **Windows**: `%APPDATA%\shopkeep\backoffice\data\`
/// - **Linux**: `~/.local/share/backoffice/`
fn default_database_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "shopkeep", "backoffice").ok_or(ConfigError::NoDataDir)?;
    Ok(dirs.data_dir().join(DB_FILE_NAME))
}

fn parse_in_range(key: &'static str, raw: &str, min: u32, max: u32) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason,
    };

    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;

    if value < min || value > max {
        return Err(invalid(format!("must be between {min} and {max}")));
    }
    Ok(value)
}
