//! HTTP adapter for billing endpoints.
//!
//! Exposes the billing module via REST API:
//! - `GET /billing` - Billing snapshot for the account page
//! - `GET /billing/chooseplan` - Snapshot for the plan selection page
//! - `GET /billing/testcoupon` - Validate a coupon code
//! - `GET /billing/setupintent` - Mint a setup intent
//! - `POST /billing/upgrade` - Subscribe to or move to a plan
//! - `POST /billing/card` - Store a new card
//! - `GET /billing/removecard` - Detach a stored card
//! - `GET /billing/setcarddefault` - Make a stored card the default
//! - `GET /billing/cancelsubscription` - Cancel at period end
//! - `GET /billing/resumesubscription` - Clear a pending cancellation
//! - `POST /billing/webhook` - Handle provider webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::billing_router;
