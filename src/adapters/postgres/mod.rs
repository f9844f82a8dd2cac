//! PostgreSQL implementations of the persistence ports.

mod event_log;
mod promo_grants;
mod subscription_store;

pub use event_log::PostgresEventLog;
pub use promo_grants::PostgresPromoGrants;
pub use subscription_store::{
    DirectUpsert, FallbackUpsert, PostgresSubscriptionStore, RpcUpsert,
};
