//! Billing provider port for the external payment service.
//!
//! The provider is the source of truth for billing state. This port covers
//! the two operations the reconciler needs: verifying that an inbound
//! webhook genuinely originated from the provider, and re-fetching a
//! subscription when an event does not carry enough data on its own
//! (checkout completions in particular omit period bounds).
//!
//! # Design
//!
//! - **Typed events**: payloads arrive as a tagged union keyed by event
//!   type, so the router matches exhaustively instead of probing loose JSON.
//! - **Idempotent**: verification and re-fetch are read-only and can be
//!   safely repeated on provider redelivery.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port for the payment provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Verify a webhook signature and parse the raw body into a typed event.
    ///
    /// The body must be the raw request bytes, untouched by any JSON
    /// decoding, since the signature covers the exact payload. Returns a
    /// configuration error when the signing secret is absent, and an
    /// invalid-webhook error when the signature does not match.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, ProviderError>;

    /// Retrieve the current subscription object by provider id.
    ///
    /// Used by handlers that need authoritative period bounds and metadata
    /// beyond what the triggering event carries.
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError>;
}

/// A verified webhook event from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider-assigned event id (evt_...), the natural idempotency key.
    pub id: String,

    /// Event type.
    pub event_type: ProviderEventType,

    /// Event payload, shaped by the event type.
    pub data: ProviderEventData,

    /// When the event occurred (Unix timestamp).
    pub created: i64,

    /// The opaque structured body as received, kept for the audit log.
    pub payload: serde_json::Value,
}

/// The webhook event types this service reconciles.
///
/// Anything else arrives as `Unrecognized` and is acknowledged without
/// state mutation: providers evolve their event catalogs, and an unhandled
/// type is routine, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventType {
    /// Checkout session completed successfully.
    CheckoutCompleted,

    /// Invoice paid successfully (renewal or recovery).
    InvoicePaymentSucceeded,

    /// Invoice payment failed.
    InvoicePaymentFailed,

    /// Subscription changed (plan, status, period).
    SubscriptionUpdated,

    /// Subscription deleted/ended.
    SubscriptionDeleted,

    /// Event type outside the recognized set.
    Unrecognized(String),
}

impl ProviderEventType {
    /// Parse the provider's wire name for an event type.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutCompleted,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// The provider's wire name for this event type.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unrecognized(s) => s,
        }
    }
}

/// Event payload, tagged by the kind of provider object it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEventData {
    /// Checkout session data.
    Checkout {
        session_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        metadata: HashMap<String, String>,
    },

    /// Subscription data.
    Subscription {
        subscription_id: String,
        customer_id: String,
        status: String,
        current_period_start: Option<i64>,
        current_period_end: Option<i64>,
        metadata: HashMap<String, String>,
    },

    /// Invoice data.
    Invoice {
        invoice_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        amount_paid: i64,
        currency: String,
    },

    /// Raw data for unrecognized event types.
    Raw { json: serde_json::Value },
}

/// A subscription object re-fetched from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider's subscription id (sub_...).
    pub id: String,

    /// Provider's customer id (cus_...).
    pub customer_id: String,

    /// Provider-reported status string.
    pub status: String,

    /// Current billing period start (Unix timestamp).
    pub current_period_start: Option<i64>,

    /// Current billing period end (Unix timestamp).
    pub current_period_end: Option<i64>,

    /// Metadata stamped at checkout; expected to contain `userId` and
    /// `tierId`.
    pub metadata: HashMap<String, String>,
}

impl ProviderSubscription {
    /// Look up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Errors from provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error code for categorization.
    pub code: ProviderErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl ProviderError {
    /// Create a new provider error.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    /// Create a configuration error (signing secret absent or unusable).
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    /// Create an invalid-webhook error (signature or timestamp rejected).
    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidWebhook, message)
    }

    /// Create a parse error (malformed header or payload).
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Parse, message)
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    /// Create a provider API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Api, message)
    }

    /// Create a not-found error for the named resource.
    pub fn not_found(resource: &str) -> Self {
        Self::new(ProviderErrorCode::NotFound, format!("{} not found", resource))
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    /// Signing secret absent or unusable.
    Configuration,

    /// Webhook signature or timestamp rejected.
    InvalidWebhook,

    /// Malformed signature header or payload.
    Parse,

    /// Network connectivity issue reaching the provider.
    Network,

    /// Provider API returned an error.
    Api,

    /// Resource not found at the provider.
    NotFound,
}

impl ProviderErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::Network | ProviderErrorCode::Api | ProviderErrorCode::NotFound
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::Configuration => "configuration",
            ProviderErrorCode::InvalidWebhook => "invalid_webhook",
            ProviderErrorCode::Parse => "parse",
            ProviderErrorCode::Network => "network",
            ProviderErrorCode::Api => "api",
            ProviderErrorCode::NotFound => "not_found",
        };
        write!(f, "{}", s)
    }
}
