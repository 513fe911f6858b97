//! Payment-intent resolution for the SCA handshake.
//!
//! After creating or updating a subscription, the provider response may
//! carry a pending setup intent (saving a card off-session) or a payment
//! intent on the latest invoice (direct payment). This module interprets
//! those into the client-facing action protocol.

use serde::{Deserialize, Serialize};

use super::errors::BillingError;
use crate::ports::RemoteSubscription;

/// Status of a provider setup/payment intent.
///
/// `requires_source_action` and `requires_source` are legacy aliases kept
/// for old provider API versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    RequiresAction,
    RequiresSourceAction,
    RequiresPaymentMethod,
    RequiresSource,
    #[serde(untagged)]
    Other(String),
}

impl IntentStatus {
    /// The client must complete an authentication challenge.
    pub fn needs_client_action(&self) -> bool {
        matches!(
            self,
            IntentStatus::RequiresAction | IntentStatus::RequiresSourceAction
        )
    }

    /// The instrument was refused; the user must supply another card.
    pub fn needs_new_payment_method(&self) -> bool {
        matches!(
            self,
            IntentStatus::RequiresPaymentMethod | IntentStatus::RequiresSource
        )
    }
}

/// Client-side action tag for completing authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthAction {
    /// Confirm saving the card (pending setup intent).
    #[serde(rename = "handleCardSetup")]
    HandleCardSetup,

    /// Confirm the payment itself (invoice payment intent).
    #[serde(rename = "handleCardPayment")]
    HandleCardPayment,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::HandleCardSetup => "handleCardSetup",
            AuthAction::HandleCardPayment => "handleCardPayment",
        }
    }
}

/// What the client must do, if anything, to finish the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Payment is settled (or needs no authentication); nothing to do.
    None,

    /// The client must drive the provider's authentication challenge.
    ActionRequired {
        action: AuthAction,
        client_secret: String,
    },
}

/// Resolve a fresh provider subscription response into a client action.
///
/// A pending setup intent wins over an invoice payment intent: an
/// off-session card confirmation makes the payment intent moot.
pub fn resolve_subscription_intent(
    subscription: &RemoteSubscription,
) -> Result<AuthRequirement, BillingError> {
    use crate::domain::billing::SubscriptionStatus;

    let (intent, action) = if let Some(intent) = &subscription.pending_setup_intent {
        (Some(intent), AuthAction::HandleCardSetup)
    } else if let Some(intent) = subscription
        .latest_invoice
        .as_ref()
        .and_then(|i| i.payment_intent.as_ref())
    {
        (Some(intent), AuthAction::HandleCardPayment)
    } else if subscription.status == SubscriptionStatus::Incomplete {
        return Err(BillingError::TransactionIncomplete);
    } else {
        (None, AuthAction::HandleCardPayment)
    };

    let intent = match intent {
        None => return Ok(AuthRequirement::None),
        Some(intent) => intent,
    };

    if intent.status == IntentStatus::Succeeded {
        return Ok(AuthRequirement::None);
    }

    if intent.status.needs_client_action() {
        return Ok(AuthRequirement::ActionRequired {
            action,
            client_secret: intent.client_secret.clone(),
        });
    }

    if intent.status.needs_new_payment_method() {
        return Err(BillingError::PaymentMethodRejected);
    }

    Err(BillingError::Unknown)
}
