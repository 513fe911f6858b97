//! Tollgate - Subscription Billing Reconciliation Service
//!
//! This crate keeps a local user's subscription state eventually consistent
//! with Stripe's authoritative billing state, across user-initiated actions
//! and asynchronous provider webhooks.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
