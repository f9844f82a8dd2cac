//! Webhook HTTP endpoint.
//!
//! One POST entrypoint. The body is taken as raw bytes and handed to the
//! reconciler untouched: the signature covers the exact payload, so any
//! JSON decoding before verification would break it.
//!
//! Response contract:
//! - `200 {"received": true}` for every outcome that is not a verification
//!   or persistence failure (skipped event types and absorbed handler
//!   failures included)
//! - `400 {"error": "Invalid signature"}` when verification fails
//! - `500 {"error": "Webhook processing failed"}` when configuration or
//!   persistence failures escape, so the provider's retry engages

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::application::{ReconcileOutcome, ReconcileWebhookCommand, ReconcileWebhookHandler};
use crate::domain::subscription::WebhookError;
use crate::ports::{BillingProvider, EventLog, PromoGrants, SubscriptionStore};

/// Shared application state containing the reconciler's dependencies.
///
/// Cloned per request; all dependencies are Arc-wrapped trait objects
/// whose lifecycle is owned by the process entry point.
#[derive(Clone)]
pub struct BillingAppState {
    pub provider: Arc<dyn BillingProvider>,
    pub store: Arc<dyn SubscriptionStore>,
    pub event_log: Arc<dyn EventLog>,
    pub promo_grants: Arc<dyn PromoGrants>,
}

impl BillingAppState {
    pub fn reconcile_handler(&self) -> ReconcileWebhookHandler {
        ReconcileWebhookHandler::new(
            self.provider.clone(),
            self.store.clone(),
            self.event_log.clone(),
            self.promo_grants.clone(),
        )
    }
}

/// Create the webhook router.
///
/// Mounted separately from any user-facing routes because webhooks use
/// signature verification instead of session authentication.
pub fn routes() -> Router<BillingAppState> {
    Router::new().route("/webhooks/stripe", post(handle_stripe_webhook))
}

/// POST /webhooks/stripe - verify and reconcile one provider event.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("Stripe-Signature").and_then(|v| v.to_str().ok()) {
        Some(signature) => signature.to_string(),
        None => {
            tracing::warn!("Webhook request missing Stripe-Signature header");
            return invalid_signature_response();
        }
    };

    let handler = state.reconcile_handler();
    let cmd = ReconcileWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match handler.handle(cmd).await {
        Ok(outcome) => {
            if let ReconcileOutcome::Acknowledged { reason } = &outcome {
                tracing::warn!(reason = %reason, "Webhook acknowledged without state change");
            }
            received_response()
        }
        Err(err) => error_response(&err),
    }
}

fn received_response() -> Response {
    (StatusCode::OK, Json(json!({"received": true}))).into_response()
}

fn invalid_signature_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Invalid signature"})),
    )
        .into_response()
}

fn error_response(err: &WebhookError) -> Response {
    if err.is_verification_failure() {
        tracing::warn!(error = %err, "Webhook verification failed");
        return invalid_signature_response();
    }

    match err.status_code() {
        StatusCode::OK => received_response(),
        status => {
            tracing::error!(error = %err, "Webhook processing failed");
            (status, Json(json!({"error": "Webhook processing failed"}))).into_response()
        }
    }
}
