//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! reconciler and the outside world. Adapters implement these ports.
//!
//! - `BillingProvider` - webhook verification and subscription re-fetch
//!   against the payment provider
//! - `SubscriptionStore` - the durable per-user subscription state, with the
//!   primary/fallback upsert strategy contract
//! - `EventLog` - append-only audit trail of processed webhook events
//! - `PromoGrants` - the one-time early-adopter promotion side effect

mod billing_provider;
mod event_log;
mod promo_grant;
mod subscription_store;

pub use billing_provider::{
    BillingProvider, ProviderError, ProviderErrorCode, ProviderEvent, ProviderEventData,
    ProviderEventType, ProviderSubscription,
};
pub use event_log::{EventLog, EventLogRecord, EventOutcome, SaveResult};
pub use promo_grant::{GrantOutcome, PromoGrants};
pub use subscription_store::{StoreError, SubscriptionStore, UpsertStrategy};
