//! Application layer - command handlers orchestrating domain and ports.

mod reconcile_webhook;

pub use reconcile_webhook::{
    ReconcileOutcome, ReconcileWebhookCommand, ReconcileWebhookHandler,
};
