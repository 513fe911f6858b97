//! Billing domain module.
//!
//! Pure subscription reconciliation logic: the plan catalog, the local
//! subscription state embedded in the user record, derived billing views,
//! payment-intent resolution, and provider event parsing.
//!
//! # Module Structure
//!
//! - `plan` - Plan and PlanCatalog
//! - `state` - BillingState and SubscriptionStatus
//! - `snapshot` - Derived view records for rendering
//! - `intent` - SCA/3-D-Secure intent resolution
//! - `event` - Provider webhook event types
//! - `errors` - BillingError taxonomy

mod errors;
mod event;
mod intent;
mod plan;
mod snapshot;
mod state;

pub use errors::BillingError;
pub use event::{
    InvoiceEventData, ProviderEvent, ProviderEventType, SubscriptionEventData,
};
pub use intent::{resolve_subscription_intent, AuthAction, AuthRequirement, IntentStatus};
pub use plan::{Plan, PlanCatalog, PlanComparison, FREE_PLAN_ID};
pub use snapshot::{
    describe_discount, format_period_date, format_usd, BillingSnapshot, InvoiceView,
    PaymentMethodView, PlanOption, SnapshotContext, SubscriptionView,
};
pub use state::{entitled_plan, BillingState, SubscriptionItemRef, SubscriptionStatus};

#[cfg(test)]
pub use event::ProviderEventBuilder;
