//! Stripe REST implementation of the PaymentGateway port.
//!
//! Talks to the form-encoded v1 API with reqwest. Wire types capture only
//! the fields the port exposes; expandable references that arrive
//! unexpanded (plain ids) collapse to `None`.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::billing::{IntentStatus, ProviderEvent, SubscriptionStatus};
use crate::ports::{
    CardCredential, CreateSubscriptionRequest, GatewayCustomer, GatewayError, PaymentGateway,
    PaymentIntent, PaymentMethodInfo, RemoteCoupon, RemoteDiscount, RemoteInvoice,
    RemoteInvoiceLine, RemotePeriod, RemoteSubscription, RemoteSubscriptionItem,
    UpdateSubscriptionRequest,
};

const API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe payment gateway.
pub struct StripeGateway {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl StripeGateway {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_base_url(api_key, API_BASE.to_string())
    }

    /// Point the gateway at a different base URL (stripe-mock, tests).
    pub fn with_base_url(api_key: SecretString, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        decode(response).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Provider(format!("malformed response: {}", err)))
    } else {
        let failure = response.json::<ApiFailure>().await.unwrap_or_default();
        Err(failure.into_error(status))
    }
}

// ─── Wire types ─────────────────────────────────────────────────────────

/// Error envelope: `{"error": {"type": ..., "message": ...}}`.
#[derive(Debug, Default, Deserialize)]
struct ApiFailure {
    #[serde(default)]
    error: ApiErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

impl ApiFailure {
    fn into_error(self, status: StatusCode) -> GatewayError {
        let message = self.error.message.unwrap_or_else(|| status.to_string());
        match (self.error.kind.as_deref(), status) {
            (Some("card_error"), _) => GatewayError::CardRejected(message),
            (_, StatusCode::NOT_FOUND) => GatewayError::NotFound(message),
            _ => GatewayError::Provider(message),
        }
    }
}

/// An expandable field: a full object when expanded, a bare id otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    fn into_object(self) -> Option<T> {
        match self {
            Expandable::Object(object) => Some(*object),
            Expandable::Id(_) => None,
        }
    }
}

/// A reference that may arrive as an id string or an embedded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ApiRef {
    Id(String),
    Object { id: String },
}

impl ApiRef {
    fn into_id(self) -> String {
        match self {
            ApiRef::Id(id) | ApiRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Default for ApiList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: ApiEventData,
}

#[derive(Debug, Deserialize)]
struct ApiEventData {
    object: serde_json::Value,
}

impl From<ApiEvent> for ProviderEvent {
    fn from(event: ApiEvent) -> Self {
        ProviderEvent {
            id: event.id,
            event_type: event.event_type,
            created: event.created,
            object: event.data.object,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiIntent {
    status: IntentStatus,
    #[serde(default)]
    client_secret: Option<String>,
}

impl From<ApiIntent> for PaymentIntent {
    fn from(intent: ApiIntent) -> Self {
        PaymentIntent {
            status: intent.status,
            client_secret: intent.client_secret.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiProduct {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unit_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPlan {
    id: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    product: Option<Expandable<ApiProduct>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiSubscriptionItem {
    id: String,
    plan: ApiPlan,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiCoupon {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    percent_off: Option<f64>,
    #[serde(default)]
    amount_off: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    duration_in_months: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiDiscount {
    coupon: ApiCoupon,
}

impl From<ApiDiscount> for RemoteDiscount {
    fn from(discount: ApiDiscount) -> Self {
        RemoteDiscount {
            coupon: RemoteCoupon {
                name: discount.coupon.name.unwrap_or_default(),
                percent_off: discount.coupon.percent_off,
                amount_off: discount.coupon.amount_off,
                currency: discount.coupon.currency,
                duration_in_months: discount.coupon.duration_in_months,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiMetadata {
    #[serde(rename = "planId")]
    plan_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPeriod {
    #[serde(default)]
    start: i64,
    #[serde(default)]
    end: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiInvoiceLine {
    period: ApiPeriod,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiInvoice {
    /// Upcoming (draft) invoices carry no id.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount_due: i64,
    #[serde(default)]
    created: Option<i64>,
    /// Older API versions call the creation time `date`.
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    attempt_count: u32,
    #[serde(default)]
    paid: bool,
    #[serde(default)]
    lines: ApiList<ApiInvoiceLine>,
    #[serde(default)]
    payment_intent: Option<Expandable<ApiIntent>>,
}

impl From<ApiInvoice> for RemoteInvoice {
    fn from(invoice: ApiInvoice) -> Self {
        RemoteInvoice {
            id: invoice.id.unwrap_or_default(),
            amount_due: invoice.amount_due,
            date: invoice.date.or(invoice.created).unwrap_or_default(),
            attempt_count: invoice.attempt_count,
            paid: invoice.paid,
            lines: invoice
                .lines
                .data
                .into_iter()
                .map(|line| RemoteInvoiceLine {
                    period: RemotePeriod {
                        start: line.period.start,
                        end: line.period.end,
                    },
                })
                .collect(),
            payment_intent: invoice
                .payment_intent
                .and_then(Expandable::into_object)
                .map(PaymentIntent::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiSubscription {
    id: String,
    customer: ApiRef,
    status: SubscriptionStatus,
    #[serde(default)]
    items: ApiList<ApiSubscriptionItem>,
    current_period_start: i64,
    current_period_end: i64,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    plan: Option<ApiPlan>,
    #[serde(default)]
    discount: Option<ApiDiscount>,
    #[serde(default)]
    metadata: ApiMetadata,
    #[serde(default)]
    pending_setup_intent: Option<Expandable<ApiIntent>>,
    #[serde(default)]
    latest_invoice: Option<Expandable<ApiInvoice>>,
}

impl From<ApiSubscription> for RemoteSubscription {
    fn from(subscription: ApiSubscription) -> Self {
        let (plan_amount, plan_currency, product) = match subscription.plan {
            Some(plan) => (
                plan.amount,
                plan.currency,
                plan.product.and_then(Expandable::into_object),
            ),
            None => (None, None, None),
        };
        let (product_name, unit_label) = match product {
            Some(product) => (product.name, product.unit_label),
            None => (None, None),
        };

        RemoteSubscription {
            id: subscription.id,
            customer_id: subscription.customer.into_id(),
            status: subscription.status,
            items: subscription
                .items
                .data
                .into_iter()
                .map(|item| RemoteSubscriptionItem {
                    id: item.id,
                    plan: item.plan.id,
                })
                .collect(),
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            plan_amount,
            plan_currency,
            product_name,
            unit_label,
            discount: subscription.discount.map(RemoteDiscount::from),
            plan_id: subscription.metadata.plan_id,
            pending_setup_intent: subscription
                .pending_setup_intent
                .and_then(Expandable::into_object)
                .map(PaymentIntent::from),
            latest_invoice: subscription
                .latest_invoice
                .and_then(Expandable::into_object)
                .map(RemoteInvoice::from),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiInvoiceSettings {
    #[serde(default)]
    default_payment_method: Option<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiCustomer {
    id: String,
    #[serde(default)]
    default_source: Option<ApiRef>,
    #[serde(default)]
    invoice_settings: Option<ApiInvoiceSettings>,
    #[serde(default)]
    subscriptions: ApiList<ApiSubscription>,
}

impl From<ApiCustomer> for GatewayCustomer {
    fn from(customer: ApiCustomer) -> Self {
        GatewayCustomer {
            id: customer.id,
            default_payment_method: customer
                .invoice_settings
                .and_then(|s| s.default_payment_method)
                .map(ApiRef::into_id),
            default_source: customer.default_source.map(ApiRef::into_id),
            subscriptions: customer
                .subscriptions
                .data
                .into_iter()
                .map(RemoteSubscription::from)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
}

#[derive(Debug, Deserialize)]
struct ApiPaymentMethod {
    id: String,
    card: ApiCard,
}

impl From<ApiPaymentMethod> for PaymentMethodInfo {
    fn from(method: ApiPaymentMethod) -> Self {
        PaymentMethodInfo {
            id: method.id,
            brand: method.card.brand,
            last4: method.card.last4,
            exp_month: method.card.exp_month,
            exp_year: method.card.exp_year,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCreatedCustomer {
    id: String,
}

// Expansions applied whenever a subscription is fetched or written, so that
// intent resolution always has the latest invoice's payment intent.
const SUBSCRIPTION_EXPANSIONS: [(&str, &str); 3] = [
    ("expand[]", "latest_invoice.payment_intent"),
    ("expand[]", "pending_setup_intent"),
    ("expand[]", "plan.product"),
];

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn retrieve_event(&self, event_id: &str) -> Result<ProviderEvent, GatewayError> {
        let event: ApiEvent = self.get(&format!("/events/{}", event_id), &[]).await?;
        Ok(event.into())
    }

    async fn create_customer(
        &self,
        email: &str,
        credential: &CardCredential,
    ) -> Result<String, GatewayError> {
        let mut form = vec![("email", email.to_string())];
        match credential {
            CardCredential::PaymentMethod(id) => {
                form.push(("payment_method", id.clone()));
                form.push(("invoice_settings[default_payment_method]", id.clone()));
            }
            CardCredential::CardToken(token) => form.push(("source", token.clone())),
        }
        let customer: ApiCreatedCustomer = self.post_form("/customers", &form).await?;
        Ok(customer.id)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, GatewayError> {
        let customer: ApiCustomer = self
            .get(
                &format!("/customers/{}", customer_id),
                &[
                    ("expand[]", "subscriptions"),
                    ("expand[]", "subscriptions.data.plan.product"),
                    ("expand[]", "subscriptions.data.latest_invoice.payment_intent"),
                ],
            )
            .await?;
        Ok(customer.into())
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post_form(
                &format!("/payment_methods/{}/attach", payment_method_id),
                &[("customer", customer_id.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post_form(
                &format!("/customers/{}", customer_id),
                &[(
                    "invoice_settings[default_payment_method]",
                    payment_method_id.to_string(),
                )],
            )
            .await?;
        Ok(())
    }

    async fn replace_default_source(
        &self,
        customer_id: &str,
        card_token: &str,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post_form(
                &format!("/customers/{}", customer_id),
                &[("source", card_token.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post_form(&format!("/payment_methods/{}/detach", payment_method_id), &[])
            .await?;
        Ok(())
    }

    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError> {
        let list: ApiList<ApiPaymentMethod> = self
            .get(
                "/payment_methods",
                &[("customer", customer_id), ("type", "card")],
            )
            .await?;
        Ok(list.data.into_iter().map(PaymentMethodInfo::from).collect())
    }

    async fn create_setup_intent(&self) -> Result<PaymentIntent, GatewayError> {
        let intent: ApiIntent = self
            .post_form("/setup_intents", &[("usage", "off_session".to_string())])
            .await?;
        Ok(intent.into())
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        let subscription: ApiSubscription = self
            .get(
                &format!("/subscriptions/{}", subscription_id),
                &SUBSCRIPTION_EXPANSIONS,
            )
            .await?;
        Ok(subscription.into())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError> {
        let mut form = vec![
            ("customer", request.customer_id),
            ("items[0][plan]", request.provider_plan_id),
            ("trial_from_plan", "true".to_string()),
            ("payment_behavior", "allow_incomplete".to_string()),
            ("metadata[planId]", request.plan_id),
        ];
        if let Some(coupon) = request.coupon {
            form.push(("coupon", coupon));
        }
        for (key, value) in SUBSCRIPTION_EXPANSIONS {
            form.push((key, value.to_string()));
        }

        let subscription: ApiSubscription = self.post_form("/subscriptions", &form).await?;
        Ok(subscription.into())
    }

    async fn update_subscription_plan(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError> {
        let mut form = vec![
            ("items[0][id]", request.item_id),
            ("items[0][plan]", request.provider_plan_id),
            ("metadata[planId]", request.plan_id),
        ];
        if let Some(coupon) = request.coupon {
            form.push(("coupon", coupon));
        }
        for (key, value) in SUBSCRIPTION_EXPANSIONS {
            form.push((key, value.to_string()));
        }

        let subscription: ApiSubscription = self
            .post_form(&format!("/subscriptions/{}", request.subscription_id), &form)
            .await?;
        Ok(subscription.into())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .post_form(
                &format!("/subscriptions/{}", subscription_id),
                &[("cancel_at_period_end", cancel.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn list_invoices(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<RemoteInvoice>, GatewayError> {
        let list: ApiList<ApiInvoice> = self
            .get(
                "/invoices",
                &[("customer", customer_id), ("limit", &limit.to_string())],
            )
            .await?;
        Ok(list.data.into_iter().map(RemoteInvoice::from).collect())
    }

    async fn upcoming_invoice(&self, customer_id: &str) -> Result<RemoteInvoice, GatewayError> {
        let invoice: ApiInvoice = self
            .get("/invoices/upcoming", &[("customer", customer_id)])
            .await?;
        Ok(invoice.into())
    }
}
