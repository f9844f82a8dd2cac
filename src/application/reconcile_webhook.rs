//! ReconcileWebhookHandler - processes payment provider webhooks.
//!
//! Control flow: verify signature -> route on event type -> run exactly one
//! reconciliation handler -> atomic state write -> best-effort audit log ->
//! acknowledge.
//!
//! ## Failure policy
//!
//! Failures the provider can fix by re-delivering (state write failed,
//! re-fetch failed) propagate as errors so the HTTP surface returns 5xx.
//! Failures re-delivery cannot fix (metadata never stamped on the event)
//! are absorbed: logged, recorded in the audit trail, acknowledged with
//! 200. Unrecognized event types are routine and acknowledged without any
//! state mutation.
//!
//! ## Idempotency
//!
//! Duplicate deliveries are tolerated because every state write carries
//! absolute values; re-applying an event rewrites the same record. The
//! audit log is keyed by provider event id but is not consulted before
//! processing - it is a diagnostic trail, not a replay filter.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{
    SubscriptionState, SubscriptionStatus, SubscriptionTier, WebhookError,
};
use crate::ports::{
    BillingProvider, EventLog, EventLogRecord, GrantOutcome, PromoGrants, ProviderError,
    ProviderErrorCode, ProviderEvent, ProviderEventData, ProviderEventType, ProviderSubscription,
    StoreError, SubscriptionStore,
};

/// Command to reconcile one inbound webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Value of the signature header.
    pub signature: String,
}

/// How a delivery was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Checkout completed; subscription state created/activated.
    Activated { user_id: String },

    /// Invoice paid; state refreshed to active with new period bounds.
    Renewed { user_id: String },

    /// Invoice payment failed; status set to past_due, nothing else.
    MarkedPastDue { provider_subscription_id: String },

    /// Subscription updated; tier/status/period synced from the event.
    Synced { user_id: String },

    /// Subscription deleted; downgraded to the free tier.
    Downgraded { user_id: String },

    /// Event type outside the recognized set; acknowledged, no mutation.
    Skipped { event_type: String },

    /// Handler could not act (missing metadata); acknowledged with a
    /// warning because re-delivery cannot fix it.
    Acknowledged { reason: String },
}

/// Handler for processing payment provider webhooks.
///
/// Dependencies are injected at construction; the process entry point owns
/// their lifecycle. Handlers never chain: exactly one runs per event.
pub struct ReconcileWebhookHandler {
    provider: Arc<dyn BillingProvider>,
    store: Arc<dyn SubscriptionStore>,
    event_log: Arc<dyn EventLog>,
    promo_grants: Arc<dyn PromoGrants>,
}

impl ReconcileWebhookHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        store: Arc<dyn SubscriptionStore>,
        event_log: Arc<dyn EventLog>,
        promo_grants: Arc<dyn PromoGrants>,
    ) -> Self {
        Self {
            provider,
            store,
            event_log,
            promo_grants,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconcileOutcome, WebhookError> {
        // 1. Verify signature and parse the raw body into a typed event
        let event = self
            .provider
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(provider_error_to_webhook_error)?;

        tracing::info!(
            event_id = %event.id,
            event_type = event.event_type.as_wire(),
            "Webhook event verified"
        );

        // 2. Route: exactly one handler per event, exhaustive over the
        // recognized set
        let result = match &event.event_type {
            ProviderEventType::CheckoutCompleted => self.handle_checkout_completed(&event).await,
            ProviderEventType::InvoicePaymentSucceeded => {
                self.handle_invoice_payment_succeeded(&event).await
            }
            ProviderEventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(&event).await
            }
            ProviderEventType::SubscriptionUpdated => {
                self.handle_subscription_updated(&event).await
            }
            ProviderEventType::SubscriptionDeleted => {
                self.handle_subscription_deleted(&event).await
            }
            ProviderEventType::Unrecognized(wire_type) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %wire_type,
                    "Unrecognized webhook event type - acknowledged without processing"
                );
                Ok(ReconcileOutcome::Skipped {
                    event_type: wire_type.clone(),
                })
            }
        };

        // 3. Resolve the absorbed class and write the audit record
        match result {
            Ok(outcome) => {
                self.log_outcome(&event, &outcome).await;
                Ok(outcome)
            }
            Err(WebhookError::MissingMetadata(field)) => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = event.event_type.as_wire(),
                    missing_field = field,
                    "Webhook event missing required metadata - acknowledged without state change"
                );
                let outcome = ReconcileOutcome::Acknowledged {
                    reason: format!("missing metadata: {}", field),
                };
                self.log_outcome(&event, &outcome).await;
                Ok(outcome)
            }
            // Retryable failures: no audit record yet, so the record the
            // successful re-delivery writes is the final word
            Err(e) => Err(e),
        }
    }

    /// Best-effort audit write. A lost audit entry must never cause the
    /// provider to retry an already-applied state change, so failures are
    /// logged and swallowed here.
    async fn log_outcome(&self, event: &ProviderEvent, outcome: &ReconcileOutcome) {
        let record = match outcome {
            ReconcileOutcome::Skipped { event_type } => {
                EventLogRecord::skipped(&event.id, event_type, event.payload.clone())
            }
            ReconcileOutcome::Acknowledged { reason } => EventLogRecord::failed(
                &event.id,
                event.event_type.as_wire(),
                event.payload.clone(),
                reason,
            ),
            _ => EventLogRecord::applied(&event.id, event.event_type.as_wire(), event.payload.clone()),
        };

        if let Err(e) = self.event_log.record(record).await {
            tracing::warn!(
                event_id = %event.id,
                error = %e,
                "Failed to write webhook audit record"
            );
        }
    }

    async fn handle_checkout_completed(
        &self,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let (subscription_id, metadata) = match &event.data {
            ProviderEventData::Checkout {
                subscription_id,
                metadata,
                ..
            } => (subscription_id.clone(), metadata),
            _ => {
                return Err(WebhookError::Parse(
                    "checkout.session.completed carried a non-checkout payload".to_string(),
                ))
            }
        };

        // Both ids must be present before anything is written
        let user_id = parse_user_id(metadata.get("userId").map(String::as_str))?;
        let tier = parse_tier(metadata.get("tierId").map(String::as_str))?;

        // A session without a subscription means a non-subscription
        // checkout reached this endpoint; re-delivery cannot change it
        let subscription_id =
            subscription_id.ok_or(WebhookError::MissingMetadata("subscription"))?;

        // The checkout event itself may not carry period data; the
        // re-fetched subscription is authoritative
        let subscription = self
            .provider
            .fetch_subscription(&subscription_id)
            .await
            .map_err(provider_error_to_webhook_error)?;

        let state = SubscriptionState::paid(
            user_id.clone(),
            tier,
            SubscriptionStatus::Active,
            subscription.id.clone(),
            subscription.customer_id.clone(),
            epoch_to_timestamp(subscription.current_period_start),
            epoch_to_timestamp(subscription.current_period_end),
        );

        self.store.upsert(&state).await.map_err(store_error)?;

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            subscription_id = %subscription.id,
            "Checkout completed, subscription activated"
        );

        // Secondary effect: the primary write has committed, so every
        // outcome here is logged and swallowed
        if tier == SubscriptionTier::Medium {
            match self.promo_grants.grant_early_adopter(&user_id).await {
                GrantOutcome::Granted { remaining } => {
                    tracing::info!(
                        user_id = %user_id,
                        remaining = remaining,
                        "Early-adopter promotion granted"
                    );
                }
                GrantOutcome::AlreadyGranted => {
                    tracing::info!(user_id = %user_id, "Early-adopter promotion already granted");
                }
                GrantOutcome::NotEligible => {
                    tracing::info!(user_id = %user_id, "Not eligible for early-adopter promotion");
                }
                GrantOutcome::Exhausted => {
                    tracing::info!(user_id = %user_id, "Early-adopter promotion pool exhausted");
                }
                GrantOutcome::Failed(reason) => {
                    tracing::warn!(
                        user_id = %user_id,
                        reason = %reason,
                        "Early-adopter promotion grant failed"
                    );
                }
            }
        }

        Ok(ReconcileOutcome::Activated {
            user_id: user_id.to_string(),
        })
    }

    async fn handle_invoice_payment_succeeded(
        &self,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let subscription_id = match &event.data {
            ProviderEventData::Invoice {
                subscription_id, ..
            } => subscription_id.clone(),
            _ => {
                return Err(WebhookError::Parse(
                    "invoice.payment_succeeded carried a non-invoice payload".to_string(),
                ))
            }
        };

        let subscription_id =
            subscription_id.ok_or(WebhookError::MissingMetadata("subscription"))?;

        let subscription = self
            .provider
            .fetch_subscription(&subscription_id)
            .await
            .map_err(provider_error_to_webhook_error)?;

        let user_id = parse_user_id(subscription.metadata_value("userId"))?;
        let tier = parse_tier(subscription.metadata_value("tierId"))?;

        let state = SubscriptionState::paid(
            user_id.clone(),
            tier,
            SubscriptionStatus::Active,
            subscription.id.clone(),
            subscription.customer_id.clone(),
            epoch_to_timestamp(subscription.current_period_start),
            epoch_to_timestamp(subscription.current_period_end),
        );

        self.store.upsert(&state).await.map_err(store_error)?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            "Invoice paid, subscription renewed"
        );

        Ok(ReconcileOutcome::Renewed {
            user_id: user_id.to_string(),
        })
    }

    async fn handle_invoice_payment_failed(
        &self,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let subscription_id = match &event.data {
            ProviderEventData::Invoice {
                subscription_id, ..
            } => subscription_id.clone(),
            _ => {
                return Err(WebhookError::Parse(
                    "invoice.payment_failed carried a non-invoice payload".to_string(),
                ))
            }
        };

        let subscription_id =
            subscription_id.ok_or(WebhookError::MissingMetadata("subscription"))?;

        // Status only. A failed payment does not terminate access: tier,
        // provider ids, and period bounds stay untouched until a
        // subsequent success or update event arrives.
        self.store
            .mark_past_due(&subscription_id)
            .await
            .map_err(store_error)?;

        tracing::warn!(
            subscription_id = %subscription_id,
            "Invoice payment failed, subscription marked past_due"
        );

        Ok(ReconcileOutcome::MarkedPastDue {
            provider_subscription_id: subscription_id,
        })
    }

    async fn handle_subscription_updated(
        &self,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let (subscription_id, customer_id, status, period_start, period_end, metadata) =
            match &event.data {
                ProviderEventData::Subscription {
                    subscription_id,
                    customer_id,
                    status,
                    current_period_start,
                    current_period_end,
                    metadata,
                } => (
                    subscription_id.clone(),
                    customer_id.clone(),
                    status.clone(),
                    *current_period_start,
                    *current_period_end,
                    metadata,
                ),
                _ => {
                    return Err(WebhookError::Parse(
                        "customer.subscription.updated carried a non-subscription payload"
                            .to_string(),
                    ))
                }
            };

        let user_id = parse_user_id(metadata.get("userId").map(String::as_str))?;
        let tier = parse_tier(metadata.get("tierId").map(String::as_str))?;

        // Fail-open status mapping: an unrecognized provider status must
        // not downgrade a paying user
        let status = SubscriptionStatus::from_provider(&status);

        let state = SubscriptionState::paid(
            user_id.clone(),
            tier,
            status,
            subscription_id,
            customer_id,
            epoch_to_timestamp(period_start),
            epoch_to_timestamp(period_end),
        );

        self.store.upsert(&state).await.map_err(store_error)?;

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            status = %status,
            "Subscription updated, state synced"
        );

        Ok(ReconcileOutcome::Synced {
            user_id: user_id.to_string(),
        })
    }

    async fn handle_subscription_deleted(
        &self,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let (customer_id, metadata) = match &event.data {
            ProviderEventData::Subscription {
                customer_id,
                metadata,
                ..
            } => (customer_id.clone(), metadata),
            _ => {
                return Err(WebhookError::Parse(
                    "customer.subscription.deleted carried a non-subscription payload".to_string(),
                ))
            }
        };

        let user_id = parse_user_id(metadata.get("userId").map(String::as_str))?;

        // Unconditional downgrade. The customer id is kept so a returning
        // user resubscribes under the same provider customer record.
        let state = SubscriptionState::canceled(user_id.clone(), Some(customer_id));

        self.store.upsert(&state).await.map_err(store_error)?;

        tracing::info!(
            user_id = %user_id,
            "Subscription deleted, downgraded to free tier"
        );

        Ok(ReconcileOutcome::Downgraded {
            user_id: user_id.to_string(),
        })
    }
}

fn parse_user_id(value: Option<&str>) -> Result<UserId, WebhookError> {
    let value = value.ok_or(WebhookError::MissingMetadata("userId"))?;
    UserId::new(value).map_err(|_| WebhookError::MissingMetadata("userId"))
}

fn parse_tier(value: Option<&str>) -> Result<SubscriptionTier, WebhookError> {
    let value = value.ok_or(WebhookError::MissingMetadata("tierId"))?;
    SubscriptionTier::parse(value).map_err(|_| WebhookError::MissingMetadata("tierId"))
}

fn epoch_to_timestamp(epoch: Option<i64>) -> Option<Timestamp> {
    epoch.and_then(Timestamp::from_unix_secs)
}

fn store_error(e: StoreError) -> WebhookError {
    WebhookError::Persistence(e.to_string())
}

fn provider_error_to_webhook_error(e: ProviderError) -> WebhookError {
    match e.code {
        ProviderErrorCode::Configuration => {
            WebhookError::Configuration("webhook signing secret not configured")
        }
        ProviderErrorCode::InvalidWebhook => WebhookError::SignatureInvalid,
        ProviderErrorCode::Parse => WebhookError::Parse(e.message),
        // Outbound re-fetch failures must not be silently absorbed; a 5xx
        // lets the provider's retry mechanism re-deliver the event later
        ProviderErrorCode::Network | ProviderErrorCode::Api | ProviderErrorCode::NotFound => {
            WebhookError::Persistence(e.message)
        }
    }
}
