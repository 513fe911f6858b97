//! Provider webhook event types.
//!
//! Only the fields our transitions read are captured; the rest of the
//! provider's event schema is ignored. The processor always re-fetches the
//! event by id, so these types describe the canonical fetched form, never a
//! delivered payload.

use serde::{Deserialize, Serialize};

use super::state::SubscriptionStatus;

/// A provider event, fetched canonically by id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEvent {
    /// Event id (evt_xxx).
    pub id: String,

    /// Raw event type string (e.g. "customer.subscription.updated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event was created (Unix timestamp).
    pub created: i64,

    /// The object that triggered the event; shape depends on the type.
    pub object: serde_json::Value,
}

impl ProviderEvent {
    /// Parse the event type into a known variant.
    pub fn parsed_type(&self) -> ProviderEventType {
        ProviderEventType::from_str(&self.event_type)
    }

    /// Read the event object as invoice data.
    pub fn invoice_data(&self) -> Result<InvoiceEventData, serde_json::Error> {
        serde_json::from_value(self.object.clone())
    }

    /// Read the event object as subscription data.
    pub fn subscription_data(&self) -> Result<SubscriptionEventData, serde_json::Error> {
        serde_json::from_value(self.object.clone())
    }
}

/// Event types the processor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEventType {
    /// Trial ends soon; notification only.
    TrialWillEnd,
    /// A stored card is about to expire; the provider notifies the user.
    SourceExpiring,
    /// An invoice payment failed; the provider runs its own dunning.
    InvoicePaymentFailed,
    /// An invoice payment succeeded.
    InvoicePaymentSucceeded,
    /// Subscription changed (period rollover, plan change, status change).
    SubscriptionUpdated,
    /// Subscription fully deleted.
    SubscriptionDeleted,
    /// Anything else; acknowledged and ignored.
    Unknown,
}

impl ProviderEventType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "customer.subscription.trial_will_end" => Self::TrialWillEnd,
            "customer.source.expiring" => Self::SourceExpiring,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrialWillEnd => "customer.subscription.trial_will_end",
            Self::SourceExpiring => "customer.source.expiring",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown => "unknown",
        }
    }
}

/// Invoice fields read from `invoice.payment_succeeded`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceEventData {
    /// Why the invoice was created; only `subscription_create` and
    /// `subscription_update` trigger a confirmation.
    pub billing_reason: Option<String>,

    /// Provider customer id.
    pub customer: String,

    /// Provider subscription id billed by this invoice.
    pub subscription: Option<String>,
}

impl InvoiceEventData {
    /// True when this invoice comes from creating or upgrading a
    /// subscription (as opposed to a routine renewal).
    pub fn is_subscription_change(&self) -> bool {
        matches!(
            self.billing_reason.as_deref(),
            Some("subscription_create") | Some("subscription_update")
        )
    }
}

/// Subscription fields read from `customer.subscription.updated` /
/// `customer.subscription.deleted`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionEventData {
    /// Provider customer id.
    pub customer: String,

    /// Subscription status at the time of the event.
    pub status: Option<SubscriptionStatus>,

    #[serde(default)]
    pub metadata: SubscriptionMetadata,
}

/// Metadata we stamp onto provider subscriptions.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionMetadata {
    /// Local plan id recorded at create/update time.
    #[serde(rename = "planId")]
    pub plan_id: Option<String>,
}

/// Builder for creating test ProviderEvent instances.
#[cfg(test)]
pub struct ProviderEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
}

#[cfg(test)]
impl Default for ProviderEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "customer.subscription.updated".to_string(),
            created: 1_700_000_000,
            object: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
impl ProviderEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> ProviderEvent {
        ProviderEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            object: self.object,
        }
    }
}
