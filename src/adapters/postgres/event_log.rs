//! PostgreSQL webhook event log.
//!
//! Append-only. The primary key on `provider_event_id` plus
//! `ON CONFLICT DO NOTHING` makes concurrent duplicate deliveries race
//! safely: exactly one row per provider event id, first writer wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::Timestamp;
use crate::ports::{EventLog, EventLogRecord, EventOutcome, SaveResult, StoreError};

/// PostgreSQL implementation of the `EventLog` port.
pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_outcome(s: &str) -> EventOutcome {
    match s {
        "applied" => EventOutcome::Applied,
        "skipped" => EventOutcome::Skipped,
        _ => EventOutcome::Failed,
    }
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn record(&self, record: EventLogRecord) -> Result<SaveResult, StoreError> {
        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events
                (provider_event_id, event_type, payload, outcome, detail, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_event_id) DO NOTHING
            RETURNING provider_event_id
            "#,
        )
        .bind(&record.provider_event_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.outcome.as_str())
        .bind(&record.detail)
        .bind(record.processed_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("event log insert failed: {}", e)))?;

        Ok(match inserted {
            Some(_) => SaveResult::Inserted,
            None => SaveResult::AlreadyExists,
        })
    }

    async fn find_by_event_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<EventLogRecord>, StoreError> {
        let row: Option<(
            String,
            String,
            serde_json::Value,
            String,
            Option<String>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT provider_event_id, event_type, payload, outcome, detail, processed_at
            FROM webhook_events
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("event log lookup failed: {}", e)))?;

        Ok(row.map(
            |(provider_event_id, event_type, payload, outcome, detail, processed_at)| {
                EventLogRecord {
                    provider_event_id,
                    event_type,
                    payload,
                    outcome: parse_outcome(&outcome),
                    detail,
                    processed_at: Timestamp::from_datetime(processed_at),
                }
            },
        ))
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE processed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("event log cleanup failed: {}", e)))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parsing_covers_storage_names() {
        assert_eq!(parse_outcome("applied"), EventOutcome::Applied);
        assert_eq!(parse_outcome("skipped"), EventOutcome::Skipped);
        assert_eq!(parse_outcome("failed"), EventOutcome::Failed);
    }

    #[test]
    fn outcome_parsing_defaults_unknown_to_failed() {
        assert_eq!(parse_outcome("???"), EventOutcome::Failed);
    }
}
