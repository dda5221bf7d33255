use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use super::core::Database;
use super::Persistence;
use crate::error::PersistenceError;
use crate::types::{AssessmentVerdict, CandidateItem, Source, SynthesizedEvent, WatchlistSuggestion};
use crate::TARGET_DB;

type SourceRow = (String, String, String, String, String, String, Option<String>);

/// Stable identifier for a synthesized event, used as its storage key.
pub fn event_id(event: &SynthesizedEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.country.trim().to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(event.headline.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

// Unit enums serialize to bare strings; store them as such.
fn enum_text<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::String(text.to_string()))
}

impl Database {
    /// Insert or replace a source definition.
    #[instrument(target = "db_query", level = "info", skip(self, source), fields(source_id = %source.id))]
    pub async fn upsert_source(&self, source: &Source) -> Result<(), PersistenceError> {
        let strategy = serde_json::to_string(&source.strategy)?;
        let status = enum_text(&source.status)?;
        self.with_lock_retry("upsert_source", || self.write_source(source, &strategy, &status))
            .await?;
        Ok(())
    }

    async fn write_source(&self, source: &Source, strategy: &str, status: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, country, url, strategy, status, frequency)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                country = excluded.country,
                url = excluded.url,
                strategy = excluded.strategy,
                status = excluded.status,
                frequency = excluded.frequency
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(&source.country)
        .bind(&source.url)
        .bind(strategy)
        .bind(status)
        .bind(&source.frequency)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn write_candidates(&self, rows: &[(String, &CandidateItem, Option<String>)], now: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for (item_id, item, custom_data) in rows {
            sqlx::query(
                r#"
                INSERT INTO candidate_items (item_id, headline, link, source, newspaper, custom_data, seen_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(item_id) DO UPDATE SET
                    headline = excluded.headline,
                    custom_data = excluded.custom_data,
                    seen_at = excluded.seen_at
                "#,
            )
            .bind(item_id)
            .bind(&item.headline)
            .bind(&item.link)
            .bind(&item.source)
            .bind(&item.newspaper)
            .bind(custom_data)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    async fn write_assessments(&self, rows: &[(&AssessmentVerdict, String, Option<String>)], now: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for (verdict, classification, quality) in rows {
            sqlx::query(
                r#"
                INSERT INTO assessments (item_id, classification, quality, confidence, reasoning, assessed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(item_id) DO UPDATE SET
                    classification = excluded.classification,
                    quality = COALESCE(excluded.quality, assessments.quality),
                    confidence = COALESCE(excluded.confidence, assessments.confidence),
                    reasoning = excluded.reasoning,
                    assessed_at = excluded.assessed_at
                "#,
            )
            .bind(&verdict.item_id)
            .bind(classification)
            .bind(quality)
            .bind(verdict.confidence.map(i64::from))
            .bind(&verdict.reasoning)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    async fn write_events(&self, rows: &[(String, &SynthesizedEvent, String)], now: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for (id, event, individuals) in rows {
            sqlx::query(
                r#"
                INSERT INTO synthesized_events (id, headline, summary, country, key_individuals, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    summary = excluded.summary,
                    key_individuals = excluded.key_individuals
                "#,
            )
            .bind(id)
            .bind(&event.headline)
            .bind(&event.summary)
            .bind(&event.country)
            .bind(individuals)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    async fn write_suggestions(&self, rows: &[(&WatchlistSuggestion, String, String)], now: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;
        for (suggestion, kind, terms) in rows {
            sqlx::query(
                r#"
                INSERT INTO watchlist_suggestions (name, type, country, rationale, source_event, search_terms, suggested_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(name, type, source_event) DO NOTHING
                "#,
            )
            .bind(&suggestion.name)
            .bind(kind)
            .bind(&suggestion.country)
            .bind(&suggestion.rationale)
            .bind(&suggestion.source_event)
            .bind(terms)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Persistence for Database {
    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| PersistenceError::Unreachable(e.to_string()))?;
        Ok(())
    }

    #[instrument(target = "db_query", level = "info", skip(self))]
    async fn load_sources(&self) -> Result<Vec<Source>, PersistenceError> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            "SELECT id, name, country, url, strategy, status, frequency FROM sources ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for (id, name, country, url, strategy, status, frequency) in rows {
            sources.push(Source {
                id,
                name,
                country,
                url,
                strategy: serde_json::from_str(&strategy)?,
                status: enum_from_text(&status)?,
                frequency,
            });
        }
        info!(target: TARGET_DB, "Loaded {} sources", sources.len());
        Ok(sources)
    }

    async fn save_candidate_items(&self, items: &[CandidateItem]) -> Result<(), PersistenceError> {
        if items.is_empty() {
            return Ok(());
        }
        let rows = items
            .iter()
            .map(|item| {
                let custom = item.custom_data.as_ref().map(serde_json::to_string).transpose()?;
                Ok((item.item_id(), item, custom))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let now = Utc::now().to_rfc3339();
        self.with_lock_retry("save_candidate_items", || self.write_candidates(&rows, &now))
            .await?;
        debug!(target: TARGET_DB, "Saved {} candidate items", rows.len());
        Ok(())
    }

    async fn save_assessments(&self, verdicts: &[AssessmentVerdict]) -> Result<(), PersistenceError> {
        if verdicts.is_empty() {
            return Ok(());
        }
        let rows = verdicts
            .iter()
            .map(|v| {
                let quality = v.quality.as_ref().map(enum_text).transpose()?;
                Ok((v, enum_text(&v.classification)?, quality))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let now = Utc::now().to_rfc3339();
        self.with_lock_retry("save_assessments", || self.write_assessments(&rows, &now))
            .await?;
        debug!(target: TARGET_DB, "Saved {} assessments", rows.len());
        Ok(())
    }

    async fn save_synthesized_events(&self, events: &[SynthesizedEvent]) -> Result<(), PersistenceError> {
        if events.is_empty() {
            return Ok(());
        }
        let rows = events
            .iter()
            .map(|event| Ok((event_id(event), event, serde_json::to_string(&event.key_individuals)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let now = Utc::now().to_rfc3339();
        self.with_lock_retry("save_synthesized_events", || self.write_events(&rows, &now))
            .await?;
        debug!(target: TARGET_DB, "Saved {} synthesized events", rows.len());
        Ok(())
    }

    async fn save_watchlist_suggestions(&self, suggestions: &[WatchlistSuggestion]) -> Result<(), PersistenceError> {
        if suggestions.is_empty() {
            return Ok(());
        }
        let rows = suggestions
            .iter()
            .map(|s| Ok((s, enum_text(&s.kind)?, serde_json::to_string(&s.search_terms)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let now = Utc::now().to_rfc3339();
        self.with_lock_retry("save_watchlist_suggestions", || self.write_suggestions(&rows, &now))
            .await?;
        debug!(target: TARGET_DB, "Saved {} watchlist suggestions", rows.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;
    use crate::types::{Classification, ExtractionStrategy, KeyIndividual, Quality, SelectorSet, SourceStatus, WatchlistType};

    fn sample_source(id: &str) -> Source {
        Source {
            id: id.to_string(),
            name: "Portfolio".to_string(),
            country: "Norway".to_string(),
            url: "https://example.com/portfolio".to_string(),
            strategy: ExtractionStrategy::Named {
                extractor: "cvcPortfolio".to_string(),
                selectors: SelectorSet::new(".portfolio__card-holder"),
            },
            status: SourceStatus::Active,
            frequency: Some("daily".to_string()),
        }
    }

    fn sample_event() -> SynthesizedEvent {
        SynthesizedEvent {
            headline: "Founder sells logistics group".to_string(),
            summary: "The founder sold the group to a fund.".to_string(),
            country: "Norway".to_string(),
            key_individuals: vec![KeyIndividual {
                name: "Kari Nordmann".to_string(),
                role_in_event: "Seller".to_string(),
                company: Some("Nordmann Logistikk".to_string()),
                email_suggestion: None,
            }],
        }
    }

    #[tokio::test]
    async fn sources_round_trip_through_storage() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_source(&sample_source("b")).await.unwrap();
        db.upsert_source(&sample_source("a")).await.unwrap();
        let mut updated = sample_source("a");
        updated.status = SourceStatus::Inactive;
        db.upsert_source(&updated).await.unwrap();

        let sources = db.load_sources().await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], updated);
        assert_eq!(sources[1], sample_source("b"));
    }

    #[tokio::test]
    async fn repeated_saves_are_upserts() {
        let db = Database::in_memory().await.unwrap();
        let items = vec![
            candidate("One", "https://example.com/1"),
            candidate("Two", "https://example.com/2"),
        ];
        db.save_candidate_items(&items).await.unwrap();
        db.save_candidate_items(&items).await.unwrap();
        assert_eq!(db.count_rows("candidate_items").await.unwrap(), 2);

        let verdict = AssessmentVerdict {
            item_id: items[0].item_id(),
            classification: Classification::Private,
            quality: Some(Quality::Good),
            confidence: Some(80),
            reasoning: "Founder exit".to_string(),
        };
        db.save_assessments(&[verdict.clone()]).await.unwrap();
        db.save_assessments(&[verdict]).await.unwrap();
        assert_eq!(db.count_rows("assessments").await.unwrap(), 1);

        db.save_synthesized_events(&[sample_event()]).await.unwrap();
        db.save_synthesized_events(&[sample_event()]).await.unwrap();
        assert_eq!(db.count_rows("synthesized_events").await.unwrap(), 1);

        let suggestion = WatchlistSuggestion {
            name: "Kari Nordmann".to_string(),
            kind: WatchlistType::Person,
            country: "Norway".to_string(),
            rationale: "Recent liquidity".to_string(),
            source_event: "Founder sells logistics group".to_string(),
            search_terms: vec!["Kari Nordmann".to_string()],
        };
        db.save_watchlist_suggestions(&[suggestion.clone(), suggestion]).await.unwrap();
        assert_eq!(db.count_rows("watchlist_suggestions").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stored_enums_use_wire_names() {
        let db = Database::in_memory().await.unwrap();
        let verdict = AssessmentVerdict {
            item_id: "abc".to_string(),
            classification: Classification::Corporate,
            quality: Some(Quality::Marginal),
            confidence: None,
            reasoning: "Listed company".to_string(),
        };
        db.save_assessments(&[verdict]).await.unwrap();
        let (classification, quality): (String, Option<String>) =
            sqlx::query_as("SELECT classification, quality FROM assessments WHERE item_id = 'abc'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(classification, "corporate");
        assert_eq!(quality.as_deref(), Some("Marginal"));
    }

    #[test]
    fn event_id_ignores_case_and_padding() {
        let mut other = sample_event();
        other.headline = "  FOUNDER sells logistics group ".to_string();
        assert_eq!(event_id(&sample_event()), event_id(&other));
    }

    #[tokio::test]
    async fn ping_succeeds_on_open_database() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.ping().await.is_ok());
    }
}
