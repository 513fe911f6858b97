//! HTTP DTOs for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing
//! API. Snapshot responses serialize the domain view records directly; the
//! DTOs here cover the command endpoints and error envelope.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{CouponCheck, SubscribeOutcome};
use crate::ports::CardCredential;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to subscribe to (or move to) a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct UpgradeRequest {
    /// Catalog plan id to subscribe to.
    #[serde(rename = "planId")]
    pub plan_id: String,

    /// Legacy card token from Elements.
    #[serde(default)]
    pub token: Option<String>,

    /// Tokenized payment method id.
    #[serde(default, rename = "paymentMethodId")]
    pub payment_method_id: Option<String>,

    /// Coupon code; unknown codes are ignored.
    #[serde(default)]
    pub coupon: Option<String>,
}

impl UpgradeRequest {
    /// The card credential carried by the request, if any. A payment method
    /// id wins over a legacy token when both are present.
    pub fn credential(&self) -> Option<CardCredential> {
        if let Some(id) = &self.payment_method_id {
            return Some(CardCredential::PaymentMethod(id.clone()));
        }
        self.token.clone().map(CardCredential::CardToken)
    }
}

/// Request to store a new card.
#[derive(Debug, Clone, Deserialize)]
pub struct AddCardRequest {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default, rename = "paymentMethodId")]
    pub payment_method_id: Option<String>,
}

impl AddCardRequest {
    pub fn credential(&self) -> Option<CardCredential> {
        if let Some(id) = &self.payment_method_id {
            return Some(CardCredential::PaymentMethod(id.clone()));
        }
        self.token.clone().map(CardCredential::CardToken)
    }
}

/// Webhook delivery body. Only the event id is read; the event itself is
/// re-fetched from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRequest {
    pub id: String,
}

/// Query string for card management endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CardIdParams {
    pub id: String,
}

/// Query string for coupon validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponParams {
    pub code: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response to an upgrade request. Empty when payment settled; otherwise
/// names the client-side authentication call and its secret.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeResponse {
    #[serde(rename = "actionRequired", skip_serializing_if = "Option::is_none")]
    pub action_required: Option<&'static str>,

    #[serde(rename = "clientSecret", skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl From<SubscribeOutcome> for UpgradeResponse {
    fn from(outcome: SubscribeOutcome) -> Self {
        match outcome {
            SubscribeOutcome::Completed => Self {
                action_required: None,
                client_secret: None,
            },
            SubscribeOutcome::AuthenticationRequired {
                action,
                client_secret,
            } => Self {
                action_required: Some(action.as_str()),
                client_secret: Some(client_secret),
            },
        }
    }
}

/// Response carrying a fresh setup intent secret.
#[derive(Debug, Clone, Serialize)]
pub struct SetupIntentResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

/// Response to coupon validation.
#[derive(Debug, Clone, Serialize)]
pub struct CouponCheckResponse {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<CouponCheck> for CouponCheckResponse {
    fn from(check: CouponCheck) -> Self {
        Self {
            valid: check.valid,
            description: check.description,
        }
    }
}

/// Empty JSON object response.
#[derive(Debug, Clone, Serialize)]
pub struct EmptyResponse {}

/// Acknowledgement returned to the webhook sender.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Standard error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::AuthAction;

    #[test]
    fn upgrade_request_prefers_payment_method_over_token() {
        let request: UpgradeRequest = serde_json::from_value(serde_json::json!({
            "planId": "pro",
            "token": "tok_1",
            "paymentMethodId": "pm_1"
        }))
        .unwrap();

        assert_eq!(
            request.credential(),
            Some(CardCredential::PaymentMethod("pm_1".to_string()))
        );
    }

    #[test]
    fn upgrade_request_without_card_has_no_credential() {
        let request: UpgradeRequest =
            serde_json::from_value(serde_json::json!({ "planId": "pro" })).unwrap();
        assert_eq!(request.credential(), None);
    }

    #[test]
    fn completed_upgrade_serializes_empty() {
        let response = UpgradeResponse::from(SubscribeOutcome::Completed);
        assert_eq!(serde_json::to_string(&response).unwrap(), "{}");
    }

    #[test]
    fn action_required_uses_client_field_names() {
        let response = UpgradeResponse::from(SubscribeOutcome::AuthenticationRequired {
            action: AuthAction::HandleCardPayment,
            client_secret: "pi_secret".to_string(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["actionRequired"], "handleCardPayment");
        assert_eq!(json["clientSecret"], "pi_secret");
    }

    #[test]
    fn invalid_coupon_omits_description() {
        let response = CouponCheckResponse::from(CouponCheck {
            valid: false,
            description: None,
        });
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"valid":false}"#
        );
    }
}
