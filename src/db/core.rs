use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::future::Future;
use std::str::FromStr;
use tokio::time::{sleep, Duration};
use tracing::{info, instrument, warn};

use crate::TARGET_DB;

const MAX_LOCK_RETRIES: u32 = 5;

#[derive(Clone, Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
}

// Helper method to check if an sqlx error is a database lock error
pub trait DbLockErrorExt {
    fn is_database_lock_error(&self) -> bool;
}

impl DbLockErrorExt for sqlx::Error {
    fn is_database_lock_error(&self) -> bool {
        match self {
            // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
            sqlx::Error::Database(err) => err.code().is_some_and(|c| c == "5" || c == "6" || c == "517"),
            _ => false,
        }
    }
}

impl Database {
    /// Get access to the database pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    #[instrument(target = "db_query", level = "info")]
    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        info!(target: TARGET_DB, "Creating database pool for: {}", database_path);

        let connect_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;

        info!(target: TARGET_DB, "Database pool created");

        let db = Database { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    /// A private in-memory database; one connection so every query sees the same data.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        let db = Database { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    /// Runs `op`, retrying with backoff while the database is locked.
    pub(crate) async fn with_lock_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, sqlx::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut backoff = 100; // initial delay in milliseconds
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_database_lock_error() && attempt < MAX_LOCK_RETRIES => {
                    warn!(target: TARGET_DB, "{}: database locked, retrying in {} ms (attempt {}/{})", what, backoff, attempt, MAX_LOCK_RETRIES);
                    sleep(Duration::from_millis(backoff)).await;
                    backoff *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
