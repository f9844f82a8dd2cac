//! Scriptable in-memory billing provider.
//!
//! Stands in for Stripe in tests and local development: webhook
//! verification returns whatever event was scripted, and subscription
//! re-fetches are served from a registered map. No network access.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{
    BillingProvider, ProviderError, ProviderEvent, ProviderSubscription,
};

/// In-memory `BillingProvider` for tests and local development.
#[derive(Default)]
pub struct MockBillingClient {
    event: Mutex<Option<ProviderEvent>>,
    subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
    fail_verification: Mutex<bool>,
    fail_fetch: Mutex<bool>,
}

impl MockBillingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the event the next `verify_webhook` call returns.
    pub fn set_event(&self, event: ProviderEvent) {
        *self.event.lock().unwrap() = Some(event);
    }

    /// Register a subscription that `fetch_subscription` will serve.
    pub fn register_subscription(&self, subscription: ProviderSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    /// Make verification fail with an invalid-webhook error.
    pub fn fail_verification(&self, fail: bool) {
        *self.fail_verification.lock().unwrap() = fail;
    }

    /// Make subscription re-fetch fail with a network error.
    pub fn fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }
}

#[async_trait]
impl BillingProvider for MockBillingClient {
    async fn verify_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<ProviderEvent, ProviderError> {
        if *self.fail_verification.lock().unwrap() {
            return Err(ProviderError::invalid_webhook("Invalid signature"));
        }
        self.event
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::parse("no event scripted"))
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(ProviderError::network("simulated network failure"));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Subscription"))
    }
}
