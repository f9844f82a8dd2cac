//! Subscription tier definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a `tierId` metadata value is not a known tier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown subscription tier: {0}")]
pub struct UnknownTier(pub String);

/// Subscription plan level governing feature access.
///
/// `Free` implies no active billing relationship: no provider subscription
/// id and no billing period bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Medium,
    Premium,
}

impl SubscriptionTier {
    /// Returns true if this tier carries a billing relationship.
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }

    /// Returns the numeric rank of this tier for comparison.
    ///
    /// Higher rank = more features.
    pub fn rank(&self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Medium => 1,
            SubscriptionTier::Premium => 2,
        }
    }

    /// The wire name used in checkout metadata (`tierId`) and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Medium => "medium",
            SubscriptionTier::Premium => "premium",
        }
    }

    /// Parses a `tierId` metadata value.
    pub fn parse(s: &str) -> Result<Self, UnknownTier> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "medium" => Ok(SubscriptionTier::Medium),
            "premium" => Ok(SubscriptionTier::Premium),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
