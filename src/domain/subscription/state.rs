//! The per-user subscription state record.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{SubscriptionStatus, SubscriptionTier};

/// Durable record of one user's subscription: tier, provider-derived status,
/// external references, and the bounds of the paid period.
///
/// Every field carries an absolute value. Reconciliation handlers always
/// write the whole record (or a single status column), never increments, so
/// re-applying the same provider event is a no-op beyond the first write.
///
/// The record is created implicitly at the first checkout-completion event
/// and never hard-deleted; cancellation downgrades it to the free tier
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub user_id: UserId,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,

    /// Provider references; None when tier = free.
    pub provider_subscription_id: Option<String>,
    pub provider_customer_id: Option<String>,

    /// Bounds of the paid period; None when tier = free.
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
}

impl SubscriptionState {
    /// State for an active paid subscription, as confirmed by the provider.
    #[allow(clippy::too_many_arguments)]
    pub fn paid(
        user_id: UserId,
        tier: SubscriptionTier,
        status: SubscriptionStatus,
        provider_subscription_id: String,
        provider_customer_id: String,
        current_period_start: Option<Timestamp>,
        current_period_end: Option<Timestamp>,
    ) -> Self {
        Self {
            user_id,
            tier,
            status,
            provider_subscription_id: Some(provider_subscription_id),
            provider_customer_id: Some(provider_customer_id),
            current_period_start,
            current_period_end,
        }
    }

    /// The post-cancellation shape: free tier, canceled status, subscription
    /// id and period bounds cleared. The provider customer id is kept so a
    /// returning user resubscribes under the same customer record.
    pub fn canceled(user_id: UserId, provider_customer_id: Option<String>) -> Self {
        Self {
            user_id,
            tier: SubscriptionTier::Free,
            status: SubscriptionStatus::Canceled,
            provider_subscription_id: None,
            provider_customer_id,
            current_period_start: None,
            current_period_end: None,
        }
    }
}
