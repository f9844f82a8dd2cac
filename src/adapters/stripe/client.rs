//! Stripe billing provider client.
//!
//! Implements the `BillingProvider` port against the Stripe API.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - An unconfigured signing secret is reported as a configuration error,
//!   never as a signature mismatch, so operators can tell a broken
//!   deployment apart from a probing attacker
//! - Secrets handled via `secrecy::SecretString`

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::PaymentConfig;
use crate::ports::{
    BillingProvider, ProviderError, ProviderEvent, ProviderEventData, ProviderEventType,
    ProviderSubscription,
};

use super::event_types::{
    hex_encode, SignatureHeader, StripeCheckoutSession, StripeInvoice, StripeSubscription,
    StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Build from the validated application payment config.
    pub fn from_payment_config(config: &PaymentConfig) -> Self {
        Self::new(
            config.stripe_api_key.clone(),
            config.stripe_webhook_secret.clone(),
        )
        .with_require_livemode(config.require_livemode)
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Reject test-mode events.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe implementation of the `BillingProvider` port.
pub struct StripeBillingClient {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingClient {
    /// Create a new client with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Verify webhook signature using HMAC-SHA256.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), ProviderError> {
        let secret = self.config.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(ProviderError::configuration(
                "STRIPE_WEBHOOK_SECRET is not set",
            ));
        }

        // 1. Validate timestamp (replay defense)
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Webhook event too old - possible replay"
            );
            return Err(ProviderError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event timestamp in the future"
            );
            return Err(ProviderError::invalid_webhook("Event timestamp in future"));
        }

        // 2. Compute expected signature over "{timestamp}.{payload}"
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ProviderError::configuration("webhook secret unusable as HMAC key"))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        // 3. Constant-time comparison
        let expected_bytes: &[u8] = expected.as_slice();
        let provided_bytes: &[u8] = &header.v1_signature;

        if expected_bytes.len() != provided_bytes.len()
            || expected_bytes.ct_eq(provided_bytes).unwrap_u8() != 1
        {
            tracing::warn!(
                expected_signature = %hex_encode(expected_bytes),
                "Invalid webhook signature"
            );
            return Err(ProviderError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Parse a verified payload into the typed event model.
    fn parse_event(&self, payload: &[u8]) -> Result<ProviderEvent, ProviderError> {
        let raw: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            ProviderError::parse(format!("Invalid JSON: {}", e))
        })?;

        let stripe_event: StripeWebhookEvent = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::parse(format!("Invalid event envelope: {}", e)))?;

        if self.config.require_livemode && !stripe_event.livemode {
            tracing::warn!(
                event_id = %stripe_event.id,
                "Rejected test-mode event in production"
            );
            return Err(ProviderError::invalid_webhook(
                "Test mode events not allowed in production",
            ));
        }

        let event_type = ProviderEventType::from_wire(&stripe_event.event_type);
        let data = extract_event_data(&event_type, &stripe_event)?;

        Ok(ProviderEvent {
            id: stripe_event.id,
            event_type,
            data,
            created: stripe_event.created,
            payload: raw,
        })
    }
}

/// Convert the wire object into the tagged event payload for its type.
fn extract_event_data(
    event_type: &ProviderEventType,
    event: &StripeWebhookEvent,
) -> Result<ProviderEventData, ProviderError> {
    match event_type {
        ProviderEventType::CheckoutCompleted => {
            let session: StripeCheckoutSession =
                serde_json::from_value(event.data.object.clone()).map_err(|e| {
                    ProviderError::parse(format!("Invalid checkout session: {}", e))
                })?;

            Ok(ProviderEventData::Checkout {
                session_id: session.id,
                customer_id: session.customer,
                subscription_id: session.subscription,
                metadata: session.metadata,
            })
        }

        ProviderEventType::SubscriptionUpdated | ProviderEventType::SubscriptionDeleted => {
            let sub: StripeSubscription = serde_json::from_value(event.data.object.clone())
                .map_err(|e| ProviderError::parse(format!("Invalid subscription: {}", e)))?;

            Ok(ProviderEventData::Subscription {
                subscription_id: sub.id,
                customer_id: sub.customer,
                status: sub.status,
                current_period_start: sub.current_period_start,
                current_period_end: sub.current_period_end,
                metadata: sub.metadata,
            })
        }

        ProviderEventType::InvoicePaymentSucceeded | ProviderEventType::InvoicePaymentFailed => {
            let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
                .map_err(|e| ProviderError::parse(format!("Invalid invoice: {}", e)))?;

            Ok(ProviderEventData::Invoice {
                invoice_id: invoice.id,
                customer_id: invoice.customer,
                subscription_id: invoice.subscription,
                amount_paid: invoice.amount_paid,
                currency: invoice.currency,
            })
        }

        ProviderEventType::Unrecognized(_) => Ok(ProviderEventData::Raw {
            json: event.data.object.clone(),
        }),
    }
}

#[async_trait]
impl BillingProvider for StripeBillingClient {
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ProviderEvent, ProviderError> {
        // Secret misconfiguration must be distinguishable before any
        // signature work happens
        if self.config.webhook_secret.expose_secret().is_empty() {
            return Err(ProviderError::configuration(
                "STRIPE_WEBHOOK_SECRET is not set",
            ));
        }

        // 1. Parse signature header
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            ProviderError::parse(e.to_string())
        })?;

        // 2. Verify signature (includes timestamp validation)
        self.verify_signature(payload, &header)?;

        // 3. Parse and convert the event
        let event = self.parse_event(payload)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type.as_wire(),
            "Webhook signature verified"
        );

        Ok(event)
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::not_found("Subscription"));
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(error = %error_text, "Stripe subscription retrieve failed");
            return Err(ProviderError::api(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let stripe_sub: StripeSubscription = response
            .json()
            .await
            .map_err(|e| ProviderError::api(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(ProviderSubscription {
            id: stripe_sub.id,
            customer_id: stripe_sub.customer,
            status: stripe_sub.status,
            current_period_start: stripe_sub.current_period_start,
            current_period_end: stripe_sub.current_period_end,
            metadata: stripe_sub.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderErrorCode;

    fn test_config() -> StripeConfig {
        StripeConfig::new("sk_test_key", "whsec_test_secret")
    }

    fn create_test_signature(secret: &str, timestamp: i64, payload: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        let result = mac.finalize().into_bytes();

        format!("t={},v1={}", timestamp, hex_encode(&result))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_new_sets_defaults() {
        let config = StripeConfig::new("api_key", "webhook_secret");
        assert_eq!(config.api_base_url, "https://api.stripe.com");
        assert!(!config.require_livemode);
    }

    #[test]
    fn config_with_base_url() {
        let config = StripeConfig::new("key", "secret").with_base_url("http://localhost:8080");
        assert_eq!(config.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn config_from_payment_config_carries_livemode_flag() {
        let payment = PaymentConfig {
            stripe_api_key: "sk_live_x".to_string(),
            stripe_webhook_secret: "whsec_x".to_string(),
            require_livemode: true,
            ..Default::default()
        };
        let config = StripeConfig::from_payment_config(&payment);
        assert!(config.require_livemode);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn verify_signature_valid() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = create_test_signature("whsec_test_secret", timestamp, payload);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(payload.as_bytes(), &header);

        assert!(result.is_ok());
    }

    #[test]
    fn verify_signature_wrong_secret_fails() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = create_test_signature("wrong_secret", timestamp, payload);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(payload.as_bytes(), &header);

        assert!(matches!(
            result.unwrap_err().code,
            ProviderErrorCode::InvalidWebhook
        ));
    }

    #[test]
    fn verify_signature_tampered_payload_fails() {
        let client = StripeBillingClient::new(test_config());
        let original = r#"{"id":"evt_test"}"#;
        let tampered = r#"{"id":"evt_hacked"}"#;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = create_test_signature("whsec_test_secret", timestamp, original);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(tampered.as_bytes(), &header);

        assert!(matches!(
            result.unwrap_err().code,
            ProviderErrorCode::InvalidWebhook
        ));
    }

    #[test]
    fn verify_signature_expired_timestamp_fails() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{"id":"evt_test"}"#;
        let old_timestamp = chrono::Utc::now().timestamp() - 600; // 10 minutes ago
        let signature = create_test_signature("whsec_test_secret", old_timestamp, payload);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(payload.as_bytes(), &header);

        let err = result.unwrap_err();
        assert!(err.message.contains("too old"));
    }

    #[test]
    fn verify_signature_future_timestamp_fails() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{"id":"evt_test"}"#;
        let future_timestamp = chrono::Utc::now().timestamp() + 120; // 2 minutes ahead
        let signature = create_test_signature("whsec_test_secret", future_timestamp, payload);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(payload.as_bytes(), &header);

        let err = result.unwrap_err();
        assert!(err.message.contains("future"));
    }

    #[test]
    fn verify_signature_small_future_skew_tolerated() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{"id":"evt_test"}"#;
        let timestamp = chrono::Utc::now().timestamp() + 30;
        let signature = create_test_signature("whsec_test_secret", timestamp, payload);

        let header = SignatureHeader::parse(&signature).unwrap();
        let result = client.verify_signature(payload.as_bytes(), &header);

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_secret_is_configuration_error_not_signature_error() {
        let client = StripeBillingClient::new(StripeConfig::new("sk_test_key", ""));
        let payload = r#"{"id":"evt_test"}"#;
        let signature = create_test_signature("whsec_test_secret", 1_700_000_000, payload);

        let result = client.verify_webhook(payload.as_bytes(), &signature).await;

        assert!(matches!(
            result.unwrap_err().code,
            ProviderErrorCode::Configuration
        ));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event Parsing
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_checkout_session_completed() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{
            "id": "evt_test",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "cs_test",
                    "customer": "cus_test",
                    "subscription": "sub_test",
                    "payment_status": "paid",
                    "metadata": {"userId": "user_7", "tierId": "medium"}
                }
            },
            "livemode": false
        }"#;

        let event = client.parse_event(payload.as_bytes()).unwrap();

        assert_eq!(event.id, "evt_test");
        assert_eq!(event.event_type, ProviderEventType::CheckoutCompleted);
        match event.data {
            ProviderEventData::Checkout {
                customer_id,
                subscription_id,
                metadata,
                ..
            } => {
                assert_eq!(customer_id.as_deref(), Some("cus_test"));
                assert_eq!(subscription_id.as_deref(), Some("sub_test"));
                assert_eq!(metadata.get("userId").unwrap(), "user_7");
            }
            _ => panic!("Expected Checkout data"),
        }
    }

    #[test]
    fn parse_subscription_updated() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{
            "id": "evt_sub",
            "type": "customer.subscription.updated",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "sub_test",
                    "customer": "cus_test",
                    "status": "past_due",
                    "current_period_start": 1704067200,
                    "current_period_end": 1706745600,
                    "metadata": {"userId": "user_42", "tierId": "premium"}
                }
            },
            "livemode": false
        }"#;

        let event = client.parse_event(payload.as_bytes()).unwrap();

        assert_eq!(event.event_type, ProviderEventType::SubscriptionUpdated);
        match event.data {
            ProviderEventData::Subscription {
                subscription_id,
                status,
                current_period_end,
                ..
            } => {
                assert_eq!(subscription_id, "sub_test");
                assert_eq!(status, "past_due");
                assert_eq!(current_period_end, Some(1706745600));
            }
            _ => panic!("Expected Subscription data"),
        }
    }

    #[test]
    fn parse_invoice_payment_failed() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{
            "id": "evt_inv",
            "type": "invoice.payment_failed",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "in_test",
                    "customer": "cus_test",
                    "subscription": "sub_123",
                    "amount_paid": 0,
                    "currency": "usd"
                }
            },
            "livemode": false
        }"#;

        let event = client.parse_event(payload.as_bytes()).unwrap();

        assert_eq!(event.event_type, ProviderEventType::InvoicePaymentFailed);
        match event.data {
            ProviderEventData::Invoice {
                subscription_id,
                amount_paid,
                ..
            } => {
                assert_eq!(subscription_id.as_deref(), Some("sub_123"));
                assert_eq!(amount_paid, 0);
            }
            _ => panic!("Expected Invoice data"),
        }
    }

    #[test]
    fn parse_unrecognized_event_type_keeps_raw_data() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{
            "id": "evt_unknown",
            "type": "some.future.event",
            "created": 1704067200,
            "data": { "object": {"foo": "bar"} },
            "livemode": false
        }"#;

        let event = client.parse_event(payload.as_bytes()).unwrap();

        assert!(matches!(
            event.event_type,
            ProviderEventType::Unrecognized(ref s) if s == "some.future.event"
        ));
        assert!(matches!(event.data, ProviderEventData::Raw { .. }));
    }

    #[test]
    fn parse_preserves_opaque_payload_for_audit() {
        let client = StripeBillingClient::new(test_config());
        let payload = r#"{
            "id": "evt_audit",
            "type": "invoice.payment_failed",
            "created": 1704067200,
            "data": { "object": {"id": "in_1"} },
            "livemode": false
        }"#;

        let event = client.parse_event(payload.as_bytes()).unwrap();

        assert_eq!(event.payload["id"], "evt_audit");
        assert_eq!(event.payload["data"]["object"]["id"], "in_1");
    }

    #[test]
    fn parse_rejects_test_mode_when_livemode_required() {
        let config = StripeConfig::new("key", "secret").with_require_livemode(true);
        let client = StripeBillingClient::new(config);

        let payload = r#"{
            "id": "evt_test",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "data": {"object": {"id": "cs_1"}},
            "livemode": false
        }"#;

        let result = client.parse_event(payload.as_bytes());
        assert!(result.unwrap_err().message.contains("Test mode"));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let client = StripeBillingClient::new(test_config());
        let result = client.parse_event(b"not valid json");
        assert!(matches!(result.unwrap_err().code, ProviderErrorCode::Parse));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Full verify_webhook flow
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verify_webhook_valid_signature_and_payload() {
        let client = StripeBillingClient::new(test_config());

        let payload = r#"{
            "id": "evt_test123",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "cs_test",
                    "customer": "cus_test",
                    "payment_status": "paid",
                    "metadata": {}
                }
            },
            "livemode": false
        }"#;

        let timestamp = chrono::Utc::now().timestamp();
        let signature = create_test_signature("whsec_test_secret", timestamp, payload);

        let result = client.verify_webhook(payload.as_bytes(), &signature).await;

        let event = result.unwrap();
        assert_eq!(event.id, "evt_test123");
        assert_eq!(event.event_type, ProviderEventType::CheckoutCompleted);
    }

    #[tokio::test]
    async fn verify_webhook_rejects_malformed_header() {
        let client = StripeBillingClient::new(test_config());
        let result = client
            .verify_webhook(br#"{"id":"evt_test"}"#, "malformed_header")
            .await;

        assert!(matches!(result.unwrap_err().code, ProviderErrorCode::Parse));
    }

    #[tokio::test]
    async fn verify_webhook_rejects_invalid_signature() {
        let client = StripeBillingClient::new(test_config());
        let signature = format!("t={},v1={}", chrono::Utc::now().timestamp(), "ab".repeat(32));

        let result = client
            .verify_webhook(br#"{"id":"evt_test"}"#, &signature)
            .await;

        assert!(matches!(
            result.unwrap_err().code,
            ProviderErrorCode::InvalidWebhook
        ));
    }
}
