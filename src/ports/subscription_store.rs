//! Subscription state store port.
//!
//! The durable record of each user's tier, status, and billing period.
//! Writes carry absolute values only, which is what makes redelivered
//! events safe: applying the same event twice writes the same record twice.
//!
//! ## Atomicity
//!
//! `upsert` must be atomic with respect to concurrent calls for the same
//! user. Last-writer-wins is acceptable: the provider is the single source
//! of truth and delivers events for one subscription in a total order, so
//! the store only has to apply each write as it arrives, never reconstruct
//! ordering.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::subscription::SubscriptionState;

/// Errors from subscription store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The write could not be committed. Callers surface this as a
    /// retryable failure rather than swallow it.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// No row matched the given provider subscription id.
    #[error("no subscription state for provider subscription {0}")]
    SubscriptionNotFound(String),
}

/// Port for the durable subscription state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Atomically write the full subscription state for a user, creating
    /// the row on first checkout and replacing it afterwards.
    async fn upsert(&self, state: &SubscriptionState) -> Result<(), StoreError>;

    /// Set `status = past_due` on the row referencing the given provider
    /// subscription id. Touches nothing else: a failed payment does not yet
    /// terminate access.
    async fn mark_past_due(&self, provider_subscription_id: &str) -> Result<(), StoreError>;
}

/// One way of committing a full-state write.
///
/// The PostgreSQL store composes two of these: a primary strategy that
/// calls a stored procedure (keeping tier/status/period changes inside one
/// transaction), and a fallback direct-update strategy used only when the
/// procedure call fails. Splitting them behind a trait keeps both paths
/// independently testable.
#[async_trait]
pub trait UpsertStrategy: Send + Sync {
    /// A short name for log lines.
    fn name(&self) -> &'static str;

    /// Attempt to commit the state.
    async fn apply(&self, state: &SubscriptionState) -> Result<(), StoreError>;
}
