//! Stripe adapter: REST payment gateway and webhook signature verification.

mod gateway;
mod signature;

pub use gateway::StripeGateway;
pub use signature::{SignatureError, WebhookSignatureVerifier};
