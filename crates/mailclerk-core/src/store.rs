//! Shared `SQLite` database handle and schema.
//!
//! All repositories share one pool so foreign-key cascades work across
//! aggregates and tests can run every repository against one in-memory
//! database.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::Result;

/// Shared database handle.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or schema creation fails.
    pub async fn connect(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Creates an in-memory database for testing.
    ///
    /// Limited to one connection: each `SQLite` in-memory connection is its
    /// own database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                email TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                credential_blob TEXT NOT NULL,
                checkpoint_at TEXT,
                last_synced_at TEXT,
                sync_in_progress INTEGER NOT NULL DEFAULT 0,
                sync_lease TEXT,
                sync_task TEXT,
                lease_acquired_at TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, email)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                provider_id TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                sender TEXT NOT NULL DEFAULT '',
                received_at TEXT NOT NULL,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                snippet TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(account_id, provider_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message_id INTEGER REFERENCES messages(id) ON DELETE CASCADE,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                merchant TEXT NOT NULL,
                txn_date TEXT NOT NULL,
                confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
                source TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                raw_payload TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                decided_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // One candidate per (message, extraction source); manual candidates
        // have no message and are exempt.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_candidates_message_source
            ON candidates(message_id, source) WHERE message_id IS NOT NULL
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for the pending approval queue
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_candidates_pending
            ON candidates(user_id, status) WHERE status = 'pending'
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the underlying pool for repository construction.
    #[must_use]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_schema_initializes() {
        let db = Database::in_memory().await.unwrap();

        // All three tables exist and are queryable.
        for table in ["accounts", "messages", "candidates"] {
            let query = format!("SELECT COUNT(*) FROM {table}");
            sqlx::query(&query).execute(db.pool()).await.unwrap();
        }
    }
}
