//! PostgreSQL subscription state store.
//!
//! Two write paths, composed behind the `UpsertStrategy` trait:
//!
//! - [`RpcUpsert`] (primary) calls the `upsert_subscription_state` stored
//!   procedure so tier, status, and period changes commit in one
//!   transaction.
//! - [`DirectUpsert`] (fallback) performs a plain `INSERT ... ON CONFLICT
//!   DO UPDATE` and is used only when the procedure call fails (e.g. after
//!   a partial migration). It writes the same field set as the procedure,
//!   including `subscription_started_at` and `canceled_at`, so a
//!   fallback-path row is indistinguishable from a primary-path row.
//!
//! `mark_past_due` is a separate status-only update: a failed payment
//! changes nothing but the status column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::subscription::SubscriptionState;
use crate::ports::{StoreError, SubscriptionStore, UpsertStrategy};

fn period_datetime(ts: &Option<crate::domain::foundation::Timestamp>) -> Option<DateTime<Utc>> {
    ts.as_ref().map(|t| *t.as_datetime())
}

/// Primary strategy: one stored-procedure call with named parameters.
pub struct RpcUpsert {
    pool: PgPool,
}

impl RpcUpsert {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UpsertStrategy for RpcUpsert {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn apply(&self, state: &SubscriptionState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            SELECT upsert_subscription_state(
                p_user_id => $1,
                p_tier => $2,
                p_status => $3,
                p_provider_subscription_id => $4,
                p_provider_customer_id => $5,
                p_current_period_start => $6,
                p_current_period_end => $7
            )
            "#,
        )
        .bind(state.user_id.as_str())
        .bind(state.tier.as_str())
        .bind(state.status.as_str())
        .bind(&state.provider_subscription_id)
        .bind(&state.provider_customer_id)
        .bind(period_datetime(&state.current_period_start))
        .bind(period_datetime(&state.current_period_end))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("upsert_subscription_state failed: {}", e)))?;

        Ok(())
    }
}

/// Fallback strategy: direct upsert on the table.
pub struct DirectUpsert {
    pool: PgPool,
}

impl DirectUpsert {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UpsertStrategy for DirectUpsert {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn apply(&self, state: &SubscriptionState) -> Result<(), StoreError> {
        // Field coverage matches the stored procedure:
        // subscription_started_at is first-write-wins, canceled_at is set
        // exactly when the status says canceled.
        sqlx::query(
            r#"
            INSERT INTO subscription_states (
                user_id, tier, status,
                provider_subscription_id, provider_customer_id,
                current_period_start, current_period_end,
                subscription_started_at, canceled_at,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                CASE WHEN $3 = 'canceled' THEN NULL ELSE $6 END,
                CASE WHEN $3 = 'canceled' THEN NOW() ELSE NULL END,
                NOW(), NOW()
            )
            ON CONFLICT (user_id) DO UPDATE SET
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                provider_subscription_id = EXCLUDED.provider_subscription_id,
                provider_customer_id = EXCLUDED.provider_customer_id,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                subscription_started_at = COALESCE(
                    subscription_states.subscription_started_at,
                    EXCLUDED.subscription_started_at
                ),
                canceled_at = CASE
                    WHEN EXCLUDED.status = 'canceled' THEN NOW()
                    ELSE NULL
                END,
                updated_at = NOW()
            "#,
        )
        .bind(state.user_id.as_str())
        .bind(state.tier.as_str())
        .bind(state.status.as_str())
        .bind(&state.provider_subscription_id)
        .bind(&state.provider_customer_id)
        .bind(period_datetime(&state.current_period_start))
        .bind(period_datetime(&state.current_period_end))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("direct upsert failed: {}", e)))?;

        Ok(())
    }
}

/// Composes a primary strategy with a fallback, trying the fallback only
/// when the primary fails.
pub struct FallbackUpsert {
    primary: Arc<dyn UpsertStrategy>,
    fallback: Arc<dyn UpsertStrategy>,
}

impl FallbackUpsert {
    pub fn new(primary: Arc<dyn UpsertStrategy>, fallback: Arc<dyn UpsertStrategy>) -> Self {
        Self { primary, fallback }
    }

    async fn apply(&self, state: &SubscriptionState) -> Result<(), StoreError> {
        let primary_err = match self.primary.apply(state).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!(
            user_id = %state.user_id,
            strategy = self.primary.name(),
            error = %primary_err,
            "Primary subscription upsert failed, trying fallback"
        );

        match self.fallback.apply(state).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %state.user_id,
                    strategy = self.fallback.name(),
                    "Fallback subscription upsert succeeded"
                );
                Ok(())
            }
            Err(fallback_err) => Err(StoreError::Persistence(format!(
                "both upsert paths failed: {} ({}); {} ({})",
                self.primary.name(),
                primary_err,
                self.fallback.name(),
                fallback_err
            ))),
        }
    }
}

/// PostgreSQL implementation of the `SubscriptionStore` port.
pub struct PostgresSubscriptionStore {
    upsert: FallbackUpsert,
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Standard composition: stored procedure first, direct update second.
    pub fn new(pool: PgPool) -> Self {
        let upsert = FallbackUpsert::new(
            Arc::new(RpcUpsert::new(pool.clone())),
            Arc::new(DirectUpsert::new(pool.clone())),
        );
        Self { upsert, pool }
    }

    /// Custom strategy composition.
    pub fn with_strategies(pool: PgPool, upsert: FallbackUpsert) -> Self {
        Self { upsert, pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn upsert(&self, state: &SubscriptionState) -> Result<(), StoreError> {
        self.upsert.apply(state).await
    }

    async fn mark_past_due(&self, provider_subscription_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_states
            SET status = 'past_due', updated_at = NOW()
            WHERE provider_subscription_id = $1
            "#,
        )
        .bind(provider_subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("mark_past_due failed: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SubscriptionNotFound(
                provider_subscription_id.to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::subscription::{SubscriptionStatus, SubscriptionTier};
    use std::sync::Mutex;

    struct ScriptedStrategy {
        strategy_name: &'static str,
        fail: bool,
        calls: Mutex<u32>,
    }

    impl ScriptedStrategy {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                strategy_name: name,
                fail: false,
                calls: Mutex::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                strategy_name: name,
                fail: true,
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl UpsertStrategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            self.strategy_name
        }

        async fn apply(&self, _state: &SubscriptionState) -> Result<(), StoreError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                Err(StoreError::Persistence("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_state() -> SubscriptionState {
        SubscriptionState::paid(
            UserId::new("user_7").unwrap(),
            SubscriptionTier::Medium,
            SubscriptionStatus::Active,
            "sub_999".to_string(),
            "cus_7".to_string(),
            Timestamp::from_unix_secs(1_700_000_000),
            Timestamp::from_unix_secs(1_702_592_000),
        )
    }

    #[tokio::test]
    async fn fallback_not_consulted_when_primary_succeeds() {
        let primary = ScriptedStrategy::ok("rpc");
        let fallback = ScriptedStrategy::ok("direct");
        let upsert = FallbackUpsert::new(primary.clone(), fallback.clone());

        upsert.apply(&test_state()).await.unwrap();

        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn fallback_used_when_primary_fails() {
        let primary = ScriptedStrategy::failing("rpc");
        let fallback = ScriptedStrategy::ok("direct");
        let upsert = FallbackUpsert::new(primary.clone(), fallback.clone());

        upsert.apply(&test_state()).await.unwrap();

        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn both_paths_failing_reports_both() {
        let primary = ScriptedStrategy::failing("rpc");
        let fallback = ScriptedStrategy::failing("direct");
        let upsert = FallbackUpsert::new(primary, fallback);

        let err = upsert.apply(&test_state()).await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("rpc"));
        assert!(msg.contains("direct"));
    }
}
