//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    add_card, cancel_subscription, create_setup_intent, get_billing_snapshot, get_choose_plan,
    handle_webhook, remove_card, resume_subscription, set_default_card, test_coupon, upgrade,
    BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `GET /` - Billing snapshot for the account page
/// - `GET /chooseplan` - Snapshot for the plan selection page
/// - `GET /testcoupon?code=` - Validate a coupon code
/// - `GET /setupintent` - Mint a setup intent for card entry
/// - `POST /upgrade` - Subscribe to or move to a plan
/// - `POST /card` - Store a new card
/// - `GET /removecard?id=` - Detach a stored card
/// - `GET /setcarddefault?id=` - Make a stored card the default
/// - `GET /cancelsubscription` - Cancel at period end
/// - `GET /resumesubscription` - Clear a pending cancellation
///
/// ## Webhook Endpoints (no auth, signature verified)
/// - `POST /webhook` - Handle provider webhook deliveries
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/", get(get_billing_snapshot))
        .route("/chooseplan", get(get_choose_plan))
        .route("/testcoupon", get(test_coupon))
        .route("/setupintent", get(create_setup_intent))
        .route("/upgrade", post(upgrade))
        .route("/card", post(add_card))
        .route("/removecard", get(remove_card))
        .route("/setcarddefault", get(set_default_card))
        .route("/cancelsubscription", get(cancel_subscription))
        .route("/resumesubscription", get(resume_subscription))
}

/// Create the webhook router.
///
/// Separate from the user routes because deliveries are authenticated by
/// signature, not by session.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// Create the complete billing module router, suitable for mounting at
/// `/billing`.
pub fn billing_router() -> Router<BillingAppState> {
    billing_routes().merge(webhook_routes())
}
