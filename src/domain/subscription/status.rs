//! Subscription status derived from provider-reported state.

use serde::{Deserialize, Serialize};

/// Local subscription status, derived solely from what the payment provider
/// reports. This service never invents a status on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is current and paid.
    Active,

    /// Last payment failed; access continues until retries are exhausted.
    PastDue,

    /// Subscription has ended.
    Canceled,

    /// Payment retries exhausted without success.
    Unpaid,
}

impl SubscriptionStatus {
    /// Maps the provider's status vocabulary onto the local enum.
    ///
    /// Provider statuses outside the recognized set map to `Active`. This is
    /// a deliberate fail-open choice: when the provider introduces a new
    /// status string (e.g. "paused"), a paying user must not be downgraded
    /// until an event arrives that we positively understand as a downgrade.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "unpaid" => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::Active,
        }
    }

    /// The storage/wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Check if this status still grants access to paid features.
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_statuses_map_directly() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_provider("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_provider("unpaid"),
            SubscriptionStatus::Unpaid
        );
    }

    #[test]
    fn unrecognized_status_fails_open_to_active() {
        assert_eq!(
            SubscriptionStatus::from_provider("paused"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("trialing"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider(""),
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn access_checks() {
        assert!(SubscriptionStatus::Active.has_access());
        assert!(SubscriptionStatus::PastDue.has_access());

        assert!(!SubscriptionStatus::Canceled.has_access());
        assert!(!SubscriptionStatus::Unpaid.has_access());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
