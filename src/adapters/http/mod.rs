//! HTTP surface for the billing service.

mod webhook;

pub use webhook::{routes, BillingAppState};
