//! Event log port - append-only audit trail of processed webhook events.
//!
//! The log exists for idempotency inspection and debugging; no
//! reconciliation read-path depends on it, and a failed log write must
//! never cause the provider to retry an already-applied state change.
//! Callers log failures and move on.

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;

use super::subscription_store::StoreError;

/// How processing of a webhook event concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A reconciliation handler ran and the state write committed.
    Applied,

    /// The event type is outside the recognized set; nothing was mutated.
    Skipped,

    /// The event was acknowledged but the handler could not act on it
    /// (e.g. metadata missing).
    Failed,
}

impl EventOutcome {
    /// Storage name for the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Skipped => "skipped",
            EventOutcome::Failed => "failed",
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone)]
pub struct EventLogRecord {
    /// Provider-assigned event id (evt_...), unique per delivery attempt
    /// chain; the natural idempotency key.
    pub provider_event_id: String,

    /// Wire name of the event type, or "unrecognized".
    pub event_type: String,

    /// Opaque structured payload as received.
    pub payload: serde_json::Value,

    /// How processing concluded.
    pub outcome: EventOutcome,

    /// Detail for failed/skipped outcomes.
    pub detail: Option<String>,

    /// When the record was written.
    pub processed_at: Timestamp,
}

impl EventLogRecord {
    /// Record for an event whose state write committed.
    pub fn applied(
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            payload,
            outcome: EventOutcome::Applied,
            detail: None,
            processed_at: Timestamp::now(),
        }
    }

    /// Record for an unrecognized event type.
    pub fn skipped(
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            payload,
            outcome: EventOutcome::Skipped,
            detail: None,
            processed_at: Timestamp::now(),
        }
    }

    /// Record for an event the handler could not act on.
    pub fn failed(
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            payload,
            outcome: EventOutcome::Failed,
            detail: Some(detail.into()),
            processed_at: Timestamp::now(),
        }
    }
}

/// Result of attempting to append a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time this event id was seen.
    Inserted,

    /// A record with this event id already exists (duplicate delivery).
    AlreadyExists,
}

/// Port for the append-only webhook event log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a record, keyed by provider event id.
    ///
    /// Implementations use insert-on-conflict-do-nothing semantics so
    /// concurrent duplicate deliveries cannot produce two rows.
    async fn record(&self, record: EventLogRecord) -> Result<SaveResult, StoreError>;

    /// Look up a record by provider event id. Diagnostics only.
    async fn find_by_event_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<EventLogRecord>, StoreError>;

    /// Delete records processed before the given instant, returning how
    /// many were removed. Retention cleanup.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}
