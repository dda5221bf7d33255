use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                country TEXT NOT NULL,
                url TEXT NOT NULL,
                strategy TEXT NOT NULL, -- JSON ExtractionStrategy
                status TEXT NOT NULL,   -- active, inactive
                frequency TEXT
            );

            CREATE TABLE IF NOT EXISTS candidate_items (
                item_id TEXT PRIMARY KEY,
                headline TEXT NOT NULL,
                link TEXT NOT NULL,
                source TEXT NOT NULL,
                newspaper TEXT NOT NULL,
                custom_data TEXT,
                seen_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_candidate_items_source ON candidate_items (source);

            CREATE TABLE IF NOT EXISTS assessments (
                item_id TEXT PRIMARY KEY,
                classification TEXT NOT NULL, -- private, public, corporate
                quality TEXT,
                confidence INTEGER,
                reasoning TEXT NOT NULL,
                assessed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_assessments_classification ON assessments (classification);

            CREATE TABLE IF NOT EXISTS synthesized_events (
                id TEXT PRIMARY KEY,
                headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                country TEXT NOT NULL,
                key_individuals TEXT NOT NULL, -- JSON array
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_synthesized_events_country ON synthesized_events (country);

            CREATE TABLE IF NOT EXISTS watchlist_suggestions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL, -- person, family, company
                country TEXT NOT NULL,
                rationale TEXT NOT NULL,
                source_event TEXT NOT NULL,
                search_terms TEXT NOT NULL, -- JSON array
                suggested_at TEXT NOT NULL,
                UNIQUE(name, type, source_event)
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
