//! Payment gateway port.
//!
//! Contract for the remote payment provider (Stripe). The provider is the
//! source of truth for subscription state; nothing returned from these
//! calls is persisted except the explicit mirrors in `BillingState`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::billing::{BillingError, IntentStatus, ProviderEvent, SubscriptionStatus};

/// A card credential supplied by the client.
///
/// Either a tokenized payment method (PaymentMethods API) or a legacy card
/// token straight from Elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardCredential {
    PaymentMethod(String),
    CardToken(String),
}

/// Customer as fetched from the provider, subscriptions expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,

    /// Default payment method id from invoice settings.
    pub default_payment_method: Option<String>,

    /// Legacy default source id.
    pub default_source: Option<String>,

    pub subscriptions: Vec<RemoteSubscription>,
}

/// A stored card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInfo {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

/// A setup or payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub status: IntentStatus,

    /// Opaque token the client uses to complete authentication.
    pub client_secret: String,
}

/// One billed item on a remote subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSubscriptionItem {
    /// Subscription item id (si_xxx).
    pub id: String,

    /// Provider plan/price id billed by this item.
    pub plan: String,
}

/// Coupon attached to a subscription's discount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCoupon {
    pub name: String,
    pub percent_off: Option<f64>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    pub duration_in_months: Option<u32>,
}

/// Discount on a remote subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDiscount {
    pub coupon: RemoteCoupon,
}

/// Billing period bounds (Unix timestamps).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RemotePeriod {
    pub start: i64,
    pub end: i64,
}

/// One line item on an invoice; carries the reliable period bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteInvoiceLine {
    pub period: RemotePeriod,
}

/// Invoice as fetched from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteInvoice {
    pub id: String,
    pub amount_due: i64,

    /// Invoice creation time (Unix timestamp).
    pub date: i64,

    pub attempt_count: u32,
    pub paid: bool,
    pub lines: Vec<RemoteInvoiceLine>,

    /// Pending payment intent, when expanded.
    pub payment_intent: Option<PaymentIntent>,
}

/// Subscription as fetched from the provider. Never persisted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub items: Vec<RemoteSubscriptionItem>,
    pub current_period_start: i64,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,

    /// Plan price in minor units, when expanded.
    pub plan_amount: Option<i64>,
    pub plan_currency: Option<String>,

    /// Product display name, when plan.product is expanded.
    pub product_name: Option<String>,
    pub unit_label: Option<String>,

    pub discount: Option<RemoteDiscount>,

    /// Local plan id stamped into the subscription's metadata at
    /// create/update time.
    pub plan_id: Option<String>,

    /// Pending off-session card confirmation.
    pub pending_setup_intent: Option<PaymentIntent>,

    /// Latest invoice with its payment intent, when expanded.
    pub latest_invoice: Option<RemoteInvoice>,
}

/// Request to create a subscription for a customer.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,

    /// Provider plan/price id to bill.
    pub provider_plan_id: String,

    /// Local plan id, stamped into subscription metadata.
    pub plan_id: String,

    /// Validated coupon code, if any.
    pub coupon: Option<String>,
}

/// Request to move an existing subscription's first item to a new plan.
#[derive(Debug, Clone)]
pub struct UpdateSubscriptionRequest {
    pub subscription_id: String,

    /// The billed item being re-pointed.
    pub item_id: String,

    pub provider_plan_id: String,
    pub plan_id: String,
    pub coupon: Option<String>,
}

/// Errors from the payment gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider refused the card.
    #[error("card rejected: {0}")]
    CardRejected(String),

    /// The referenced resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The provider returned an error response.
    #[error("provider error: {0}")]
    Provider(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),
}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::CardRejected(_) => BillingError::PaymentMethodRejected,
            other => BillingError::Gateway(other.to_string()),
        }
    }
}

/// Port for the remote payment provider.
///
/// Every call is a suspension point; none retries automatically.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch an event canonically by id. Spoofed or stale deliveries fail
    /// here.
    async fn retrieve_event(&self, event_id: &str) -> Result<ProviderEvent, GatewayError>;

    /// Create a customer with the given card credential. Returns the new
    /// customer id.
    async fn create_customer(
        &self,
        email: &str,
        credential: &CardCredential,
    ) -> Result<String, GatewayError>;

    /// Fetch a customer with subscriptions and plan/product expansion.
    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, GatewayError>;

    /// Attach a tokenized payment method to a customer.
    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), GatewayError>;

    /// Make a payment method the customer's invoice default.
    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), GatewayError>;

    /// Replace the customer's legacy default source with a card token.
    async fn replace_default_source(
        &self,
        customer_id: &str,
        card_token: &str,
    ) -> Result<(), GatewayError>;

    /// Detach a payment method from its customer.
    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<(), GatewayError>;

    /// List the customer's stored cards.
    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError>;

    /// Create a setup intent for off-session usage.
    async fn create_setup_intent(&self) -> Result<PaymentIntent, GatewayError>;

    /// Fetch a subscription by id.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, GatewayError>;

    /// Create a subscription, allowing incomplete payment states and
    /// trial-from-plan semantics, with the latest invoice's payment intent
    /// expanded.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError>;

    /// Re-point an existing subscription's billed item to a new plan.
    async fn update_subscription_plan(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError>;

    /// Set or clear the deferred-cancellation flag.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<(), GatewayError>;

    /// List the customer's most recent invoices.
    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<RemoteInvoice>, GatewayError>;

    /// Fetch the upcoming (draft) invoice, when one exists.
    async fn upcoming_invoice(&self, customer_id: &str) -> Result<RemoteInvoice, GatewayError>;
}
