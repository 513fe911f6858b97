//! Billing handlers.
//!
//! Each handler owns the ports it needs behind `Arc<dyn Port>` and exposes
//! one `async` entry point per operation. Handlers load the user record
//! themselves; the HTTP layer only supplies the authenticated user id.

mod payment_methods;
mod snapshot;
mod subscribe;
mod webhook;

pub use payment_methods::PaymentMethodManager;
pub use snapshot::SnapshotBuilder;
pub use subscribe::{CouponCheck, SubscribeCommand, SubscribeOutcome, SubscriptionReconciler};
pub use webhook::WebhookProcessor;

#[cfg(test)]
pub(crate) mod test_support;
