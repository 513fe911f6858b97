//! Billing error taxonomy.
//!
//! Every variant maps to a user-facing, human-readable failure; raw provider
//! payloads never leak to the client. Operator detail travels through
//! `tracing` at the call site before translation.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PaymentRequired | 402 |
//! | PaymentMethodRejected | 402 |
//! | InvalidPlan | 400 |
//! | ProvisioningFailed | 502 |
//! | TransactionIncomplete | 402 |
//! | Unknown | 500 |
//! | Store | 500 |
//! | Gateway | 502 |

use thiserror::Error;

/// Errors surfaced by billing operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingError {
    /// Neither a stored customer nor a fresh card token was supplied.
    #[error("Sorry! We need a credit card to subscribe you.")]
    PaymentRequired,

    /// The provider refused the instrument; the user must try another card.
    #[error("Sorry, we couldn't process your credit card. Please check with your bank.")]
    PaymentMethodRejected,

    /// The requested plan id is not in the catalog.
    #[error("Invalid plan.")]
    InvalidPlan,

    /// Provider-side subscription create/update failed; no local write.
    #[error("Error subscribing you to the correct plan. Please contact support.")]
    ProvisioningFailed,

    /// Subscription is incomplete with no resolvable intent.
    #[error("We couldn't complete the transaction.")]
    TransactionIncomplete,

    /// Intent in a state we don't recognize.
    #[error("Unknown error with your subscription. Please try with another card.")]
    Unknown,

    /// User store failure, or a user lookup that violated an invariant.
    #[error("Something went wrong on our side. Please try again.")]
    Store(String),

    /// Provider call failed outside the provisioning step.
    #[error("Our payment provider is unavailable. Please try again.")]
    Gateway(String),
}

impl BillingError {
    /// Operator-facing detail, where the variant carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            BillingError::Store(detail) | BillingError::Gateway(detail) => Some(detail),
            _ => None,
        }
    }
}
