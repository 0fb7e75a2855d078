//! Billing core for a landscaping business: work-order costing, the billing
//! lifecycle, billing documents and payment reconciliation.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
