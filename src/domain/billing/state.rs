//! Local subscription state embedded in the user record.
//!
//! This is the state both entry paths (user actions and webhooks) converge
//! on. All transitions are idempotent assignments so that at-least-once
//! webhook delivery converges to the same final state.

use serde::{Deserialize, Serialize};

use super::plan::FREE_PLAN_ID;

/// Subscription status mirrored from the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Incomplete,
    IncompleteExpired,
    Canceled,
    Unpaid,
    /// Status string we don't recognize; kept verbatim for diagnosis.
    #[serde(untagged)]
    Other(String),
}

impl SubscriptionStatus {
    /// Whether this status still entitles the user to their paid plan.
    ///
    /// `incomplete` and `past_due` keep access: the provider is still
    /// retrying payment and may yet succeed.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing
                | SubscriptionStatus::Active
                | SubscriptionStatus::Incomplete
                | SubscriptionStatus::PastDue
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One billed item mirrored from the remote subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItemRef {
    /// Provider-side subscription item id (si_xxx).
    pub id: String,

    /// Provider-side plan/price id billed by this item.
    pub plan: String,
}

/// Billing state embedded in the user record.
///
/// `subscription_id` is `None` iff the user has never had a paid
/// subscription or it was fully deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingState {
    /// Provider customer id (cus_xxx), set lazily on first card.
    #[serde(default)]
    pub customer_id: Option<String>,

    /// Provider subscription id (sub_xxx).
    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Mirror of the remote subscription's billed items.
    #[serde(default)]
    pub subscription_items: Vec<SubscriptionItemRef>,

    /// Deferred-cancellation marker (cancel at period end).
    #[serde(default)]
    pub canceled: bool,

    /// Mirrored provider status. `None` means status tracking is off for
    /// this record; webhook updates only overwrite it when present.
    #[serde(default)]
    pub subscription_status: Option<SubscriptionStatus>,
}

impl BillingState {
    /// Reset to the free baseline after a subscription is fully deleted.
    pub fn clear_subscription(&mut self) {
        self.subscription_id = None;
        self.subscription_items.clear();
        self.canceled = false;
    }

    /// Whether status tracking is configured for this record.
    pub fn tracks_status(&self) -> bool {
        self.subscription_status.is_some()
    }
}

/// Entitlement decay: the plan a user may keep given the provider status.
///
/// Returns `plan_id` when the status still grants access, otherwise the
/// free plan.
pub fn entitled_plan(plan_id: &str, status: &SubscriptionStatus) -> String {
    if status.grants_access() {
        plan_id.to_string()
    } else {
        FREE_PLAN_ID.to_string()
    }
}
