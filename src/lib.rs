//! PlantsPack Billing - Subscription Event Reconciler
//!
//! Verifies Stripe webhook deliveries, routes each event to a single
//! reconciliation handler, and applies idempotent writes to the per-user
//! subscription state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
