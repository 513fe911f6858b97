//! Derived billing views for rendering.
//!
//! Fetched provider objects are never mutated in place; everything the
//! presentation layer needs is projected into these explicit records.

use chrono::{TimeZone, Utc};
use serde::Serialize;

use super::plan::Plan;

/// Where a snapshot is rendered; controls which plans are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotContext {
    /// Account/billing page; the upgrade modal. Free and current plan hidden.
    Account,

    /// Standalone choose-a-plan page. Current plan hidden unless staying on
    /// it is allowed by configuration.
    ChoosePage,
}

/// A plan the user could move to, annotated against their current plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOption {
    #[serde(flatten)]
    pub plan: Plan,

    /// Ranked above the user's current plan.
    pub is_higher: bool,

    /// Ranked below the user's current plan.
    pub is_lower: bool,
}

/// A customer's card on file.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodView {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub is_default: bool,
}

/// An active subscription, formatted for display.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub id: String,
    pub name: Option<String>,
    pub unit_label: Option<String>,

    /// Monthly/periodic amount as a currency string, e.g. "$15.00".
    pub amount: Option<String>,

    pub current_period_start: String,
    pub current_period_end: String,
    pub cancel_at_period_end: bool,

    /// Human-readable coupon description, when a discount is attached.
    pub discount_description: Option<String>,
}

/// An invoice, formatted for display. Zero-due invoices are filtered out
/// before this record is built.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    pub id: String,
    pub amount: String,
    pub date: String,

    /// Period bounds from the invoice's first line item. The invoice's own
    /// period field is wrong for the first invoice of a subscription.
    pub period_start: String,
    pub period_end: String,

    /// More than one payment attempt and still unpaid.
    pub unpaid: bool,
}

/// Read-only view of a customer's current billing state.
#[derive(Debug, Clone, Serialize)]
pub struct BillingSnapshot {
    pub user_plan: Option<Plan>,
    pub upgradable_plans: Vec<PlanOption>,
    pub payment_methods: Vec<PaymentMethodView>,
    pub subscriptions: Vec<SubscriptionView>,
    pub invoices: Vec<InvoiceView>,
}

impl BillingSnapshot {
    /// Snapshot for a user with no provider customer: nothing remote to
    /// show, and nothing was fetched.
    pub fn empty_remote(user_plan: Option<Plan>, upgradable_plans: Vec<PlanOption>) -> Self {
        Self {
            user_plan,
            upgradable_plans,
            payment_methods: Vec::new(),
            subscriptions: Vec::new(),
            invoices: Vec::new(),
        }
    }
}

/// Format a minor-unit USD amount as "$1,234.56".
pub fn format_usd(amount_minor: i64) -> String {
    let negative = amount_minor < 0;
    let cents = amount_minor.unsigned_abs();
    let dollars = cents / 100;
    let rem = cents % 100;

    let mut grouped = String::new();
    let digits = dollars.to_string();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}${}.{:02}", if negative { "-" } else { "" }, grouped, rem)
}

/// Format a Unix timestamp as a short date, e.g. "Aug 24, 2026".
pub fn format_period_date(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%b %-d, %Y").to_string(),
        _ => String::new(),
    }
}

/// Human-readable description of an attached coupon.
///
/// Percentage coupons read "Name: -25% for 3 months"; fixed-amount coupons
/// read "Name: -500 usd for 3 months".
pub fn describe_discount(
    name: &str,
    percent_off: Option<f64>,
    amount_off: Option<i64>,
    currency: Option<&str>,
    duration_in_months: Option<u32>,
) -> String {
    let reduction = match (percent_off, amount_off) {
        (Some(pct), _) => format!("{}%", pct),
        (None, Some(amount)) => {
            format!("{} {}", amount, currency.unwrap_or_default())
        }
        (None, None) => String::new(),
    };
    let months = duration_in_months.unwrap_or(0);
    format!("{}: -{} for {} months", name, reduction, months)
}
