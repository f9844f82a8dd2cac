//! Early-adopter promotion port.
//!
//! PlantsPack grants a one-time promotion to the first wave of medium-tier
//! subscribers. The grant is a secondary effect of checkout reconciliation:
//! whatever happens here, the primary subscription write has already
//! committed, so every outcome short of `Granted` is logged and swallowed,
//! never escalated.
//!
//! The outcome is a typed value rather than an error with a message to
//! string-match on; the handler branches on the variant.

use async_trait::async_trait;

use crate::domain::foundation::UserId;

/// Result of attempting an early-adopter grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The grant was recorded; `remaining` slots are left in the pool.
    Granted { remaining: u32 },

    /// This user already holds the grant (duplicate checkout delivery).
    AlreadyGranted,

    /// The user does not qualify (e.g. not a first-time subscriber).
    NotEligible,

    /// The promotion pool is exhausted.
    Exhausted,

    /// Infrastructure failure while recording the grant.
    Failed(String),
}

impl GrantOutcome {
    /// True when a new grant was recorded.
    pub fn is_granted(&self) -> bool {
        matches!(self, GrantOutcome::Granted { .. })
    }
}

/// Port for the early-adopter promotion pool.
#[async_trait]
pub trait PromoGrants: Send + Sync {
    /// Attempt to grant the one-time early-adopter promotion to a user.
    ///
    /// Infallible at the type level: infrastructure failures come back as
    /// `GrantOutcome::Failed` because callers treat every non-granted
    /// outcome the same way (log and continue).
    async fn grant_early_adopter(&self, user_id: &UserId) -> GrantOutcome;
}
