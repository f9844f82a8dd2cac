//! Webhook error taxonomy.
//!
//! Each variant maps to an HTTP status that determines the provider's retry
//! behavior: non-2xx responses make Stripe re-deliver the event, 2xx and 4xx
//! end delivery. The split encodes one policy: failures the provider can fix
//! by retrying (transient persistence issues) surface as 5xx; failures
//! retrying cannot fix (bad signature, missing metadata) do not.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook verification and reconciliation.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed: a forged request, a tampered
    /// body, or a replayed delivery outside the timestamp window.
    #[error("Invalid signature")]
    SignatureInvalid,

    /// Failed to parse the webhook payload or signature header.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The webhook signing secret is not configured. Kept distinct from
    /// `SignatureInvalid` so operators can tell a misconfigured deployment
    /// apart from an attacker probing the endpoint.
    #[error("Configuration error: {0}")]
    Configuration(&'static str),

    /// Required metadata field missing from the event or the re-fetched
    /// subscription. Absorbed by the reconciler: the provider retrying the
    /// delivery cannot supply metadata that was never stamped.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// The primary state write (and its fallback) failed, or the outbound
    /// re-fetch from the provider failed. Surfaced as 5xx so the provider's
    /// webhook retry re-delivers the event.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Persistence(_) | WebhookError::Configuration(_)
        )
    }

    /// Maps the error to the HTTP status returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Verification failures: reject, no retry expected
            WebhookError::SignatureInvalid | WebhookError::Parse(_) => StatusCode::BAD_REQUEST,

            // Operator must fix the deployment; keep the provider retrying
            // so no event is acknowledged and lost in the meantime
            WebhookError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // Absorbed at the reconciler; if it ever reaches the HTTP
            // surface it is still acknowledged
            WebhookError::MissingMetadata(_) => StatusCode::OK,

            // Retryable: provider re-delivers
            WebhookError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is a verification-class rejection (the event never
    /// reached the router).
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::SignatureInvalid | WebhookError::Parse(_)
        )
    }
}
