//! PostgreSQL early-adopter promotion pool.
//!
//! The pool is a single counter row; a grant claims a slot with one guarded
//! `UPDATE ... RETURNING`, so two concurrent checkouts can never
//! overcommit the pool. Per-user uniqueness comes from the primary key on
//! the redemptions table. Both writes happen in one transaction: losing the
//! uniqueness race releases the claimed slot.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::UserId;
use crate::ports::{GrantOutcome, PromoGrants};

const POOL_NAME: &str = "early_adopter";

/// PostgreSQL implementation of the `PromoGrants` port.
pub struct PostgresPromoGrants {
    pool: PgPool,
}

impl PostgresPromoGrants {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_grant(&self, user_id: &UserId) -> Result<GrantOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Claim a slot. The WHERE clause makes the claim and the bound
        // check one atomic statement.
        let slot: Option<(i32, i32)> = sqlx::query_as(
            r#"
            UPDATE promo_pools
            SET granted = granted + 1, updated_at = NOW()
            WHERE name = $1 AND granted < total
            RETURNING total, granted
            "#,
        )
        .bind(POOL_NAME)
        .fetch_optional(&mut *tx)
        .await?;

        let (total, granted) = match slot {
            Some(counts) => counts,
            None => {
                tx.rollback().await?;
                let exists: Option<(i32,)> =
                    sqlx::query_as("SELECT 1 FROM promo_pools WHERE name = $1")
                        .bind(POOL_NAME)
                        .fetch_optional(&self.pool)
                        .await?;
                return Ok(if exists.is_some() {
                    GrantOutcome::Exhausted
                } else {
                    // No pool configured for this deployment
                    GrantOutcome::NotEligible
                });
            }
        };

        let redeemed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO early_adopter_grants (user_id, granted_at)
            VALUES ($1, NOW())
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if redeemed.is_none() {
            // Duplicate checkout delivery; release the claimed slot
            tx.rollback().await?;
            return Ok(GrantOutcome::AlreadyGranted);
        }

        tx.commit().await?;

        Ok(GrantOutcome::Granted {
            remaining: (total - granted).max(0) as u32,
        })
    }
}

#[async_trait]
impl PromoGrants for PostgresPromoGrants {
    async fn grant_early_adopter(&self, user_id: &UserId) -> GrantOutcome {
        match self.try_grant(user_id).await {
            Ok(outcome) => outcome,
            // Infrastructure failures become a typed outcome: the caller
            // treats every non-granted result the same way
            Err(e) => GrantOutcome::Failed(e.to_string()),
        }
    }
}
