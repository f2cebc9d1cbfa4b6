//! # Shopkeep Back-office Library
//!
//! Configuration, tracing setup and the command layer of the back office.
//!
//! ## Module Organization
//! ```text
//! shopkeep_backoffice/
//! ├── lib.rs          ◄─── You are here (startup helpers)
//! ├── config.rs       ◄─── SHOPKEEP_* environment configuration
//! ├── error.rs        ◄─── API error type for commands
//! └── commands/
//!     ├── product.rs  ◄─── Catalog and stock ledger
//!     ├── order.rs    ◄─── Sales, debts, exchanges, returns
//!     ├── purchase.rs ◄─── Supplier deliveries
//!     └── report.rs   ◄─── Statistics and restock
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. BackofficeConfig::from_env() ── SHOPKEEP_* variables + defaults    │
//! │  2. init_tracing(&config)        ── EnvFilter from SHOPKEEP_LOG        │
//! │  3. connect(&config)             ── create data dir, open pool,        │
//! │                                     run migrations                     │
//! │  4. commands::* with &Database                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod error;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::BackofficeConfig;
use error::ApiError;
use shopkeep_db::Database;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `SHOPKEEP_LOG=debug` - Show debug messages
/// - `RUST_LOG=shopkeep_db=trace` - Used when `SHOPKEEP_LOG` is unset
/// - Default: `info,shopkeep=debug,sqlx=warn`
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(config: &BackofficeConfig) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Opens the configured database, creating its directory if needed.
pub async fn connect(config: &BackofficeConfig) -> Result<Database, ApiError> {
    if let Some(dir) = config.database_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| {
                ApiError::internal(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
    }

    let db = Database::new(config.db_config()).await?;
    info!(
        path = %config.database_path.display(),
        store = %config.store_name,
        "Database connected and migrations applied"
    );
    Ok(db)
}
