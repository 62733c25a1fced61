//! SQLite persistence layer for Guardian.
//!
//! This crate provides async database operations for emergency contacts,
//! location history and the alert outbox using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{contact, Database, EmergencyContact};
//! use guardian_core::SyncStatus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:guardian.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Store a contact locally; the id is replaced once the backend accepts it
//!     let sister = EmergencyContact {
//!         id: guardian_core::placeholder::generate(),
//!         name: "Maya".to_string(),
//!         phone: "+15551234567".to_string(),
//!         relationship: "Sister".to_string(),
//!         is_primary: true,
//!         sync_status: SyncStatus::Pending,
//!         revision: 0,
//!     };
//!     contact::create_contact(db.pool(), &sister).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod alert_outbox;
pub mod contact;
pub mod error;
pub mod location;
pub mod models;

pub use error::{DatabaseError, Result};
pub use models::{EmergencyContact, LocationSample, OutboxAlert};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// How long a caller waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long SQLite retries a locked database before failing a statement.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the local store. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const DEFAULT_POOL_SIZE: u32 = 5;

    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite:data/guardian.db?mode=rwc`.
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// let db = database::Database::connect("sqlite:data/guardian.db?mode=rwc").await?;
    ///
    /// // Every in-memory connection is a separate database: use one.
    /// let scratch = database::Database::connect_with_pool_size("sqlite::memory:", 1).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        info!(url = %url, pool_size = pool_size, "Connected to local store");
        Ok(Self { pool })
    }

    /// Bring the schema up to date. Safe to call on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Local store schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
