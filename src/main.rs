//! PlantsPack billing service entry point.
//!
//! Owns the lifecycle of every injected dependency: configuration, the
//! database pool, the Stripe client, and the persistence adapters are all
//! constructed here and handed to the router. Nothing is initialized by
//! import side effects.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plantspack_billing::adapters::http::{routes, BillingAppState};
use plantspack_billing::adapters::postgres::{
    PostgresEventLog, PostgresPromoGrants, PostgresSubscriptionStore,
};
use plantspack_billing::adapters::stripe::{StripeBillingClient, StripeConfig};
use plantspack_billing::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration before tracing so the log filter is configurable
    let config = AppConfig::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting PlantsPack billing service"
    );

    config.validate()?;
    tracing::info!("Configuration validated");

    if config.payment.is_test_mode() {
        tracing::warn!("Stripe is in TEST mode");
    }

    // Database pool
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;
    tracing::info!("Database connection established");

    if config.database.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    // Wire up the reconciler's dependencies
    let stripe = StripeBillingClient::new(StripeConfig::from_payment_config(&config.payment));

    let state = BillingAppState {
        provider: Arc::new(stripe),
        store: Arc::new(PostgresSubscriptionStore::new(pool.clone())),
        event_log: Arc::new(PostgresEventLog::new(pool.clone())),
        promo_grants: Arc::new(PostgresPromoGrants::new(pool)),
    };

    let app = routes().with_state(state).layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, "Listening for webhook deliveries");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
