//! Configuration handling for the store.
//!
//! Process-level wiring: values come from CLI arguments with environment
//! variable fallbacks. The library itself never reads the environment -
//! whoever owns the process parses a `Config` and injects the pieces.

use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:occ-store.db";
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Runtime configuration, from CLI arguments and environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "occ-store", version, about = "Versioned record store demo")]
pub struct Config {
    /// SQLite database URL, e.g. sqlite:data/products.db
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Connections opened eagerly at pool initialization.
    #[arg(long, env = "POOL_MIN_CONNECTIONS", default_value_t = DEFAULT_MIN_CONNECTIONS)]
    pub pool_min_connections: u32,

    /// Upper bound on simultaneously open connections.
    #[arg(long, env = "POOL_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub pool_max_connections: u32,

    /// Directory holding <entity>/<operation>.sql statement files.
    /// Falls back to the statements embedded in the binary.
    #[arg(long, env = "SQL_DIR")]
    pub sql_dir: Option<PathBuf>,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long, env = "JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl Config {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_max_connections == 0 {
            return Err("pool_max_connections must be greater than 0".to_string());
        }
        if self.pool_min_connections > self.pool_max_connections {
            return Err(format!(
                "pool_min_connections ({}) cannot exceed pool_max_connections ({})",
                self.pool_min_connections, self.pool_max_connections
            ));
        }
        Ok(())
    }

    /// Build SQLite connect options: WAL journal so readers are never
    /// blocked by an in-flight writer, a busy timeout so queued writers wait
    /// instead of failing, create-if-missing for first runs.
    ///
    /// Accepts `sqlite:` URLs and plain file paths. Other schemes are
    /// rejected here; `SqliteConnectOptions::from_str` would silently treat
    /// them as a filename.
    pub fn connect_options(&self) -> Result<SqliteConnectOptions, String> {
        if let Some((scheme, _)) = self.database_url.split_once("://") {
            if !scheme.eq_ignore_ascii_case("sqlite") {
                return Err(format!(
                    "Unsupported database URL scheme '{}': only sqlite is supported",
                    scheme
                ));
            }
        }
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| format!("Invalid database URL '{}': {}", self.database_url, e))?;
        Ok(options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS)))
    }
}
