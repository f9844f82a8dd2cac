//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port against the Stripe API:
//! - Webhook signature verification (HMAC-SHA256, constant-time comparison,
//!   5-minute replay window)
//! - Conversion of raw webhook payloads into the typed event model
//! - Subscription re-fetch for handlers that need authoritative period data
//!
//! Secrets are handled via `secrecy::SecretString`.

mod client;
mod event_types;
mod mock_client;

pub use client::{StripeBillingClient, StripeConfig};
pub use event_types::{
    hex_encode, SignatureHeader, SignatureParseError, StripeCheckoutSession, StripeInvoice,
    StripeSubscription, StripeWebhookEvent,
};
pub use mock_client::MockBillingClient;
