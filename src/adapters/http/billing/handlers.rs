//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the application layer handlers.
//! Card and subscription management endpoints answer with a redirect to the
//! account page; data endpoints answer with JSON.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};

use crate::application::handlers::billing::{
    PaymentMethodManager, SnapshotBuilder, SubscribeCommand, SubscriptionReconciler,
    WebhookProcessor,
};
use crate::adapters::stripe::WebhookSignatureVerifier;
use crate::config::{BillingCatalog, BillingConfig};
use crate::domain::billing::{BillingError, SnapshotContext};
use crate::ports::{BillingHooks, Notifier, PaymentGateway, UserRecord, UserStore};

use super::dto::{
    AddCardRequest, CardIdParams, CouponCheckResponse, CouponParams, EmptyResponse, ErrorResponse,
    SetupIntentResponse, UpgradeRequest, UpgradeResponse, WebhookAck, WebhookRequest,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; everything inside is Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    pub store: Arc<dyn UserStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub hooks: Arc<dyn BillingHooks>,
    pub catalog: Arc<BillingCatalog>,
    pub settings: Arc<BillingConfig>,

    /// Verifier for webhook deliveries. `None` disables verification, for
    /// local development against replayed fixtures only.
    pub webhook_verifier: Option<Arc<WebhookSignatureVerifier>>,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn snapshot_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder::new(
            self.store.clone(),
            self.gateway.clone(),
            self.catalog.clone(),
            self.settings.clone(),
        )
    }

    pub fn card_manager(&self) -> PaymentMethodManager {
        PaymentMethodManager::new(self.store.clone(), self.gateway.clone())
    }

    pub fn reconciler(&self) -> SubscriptionReconciler {
        SubscriptionReconciler::new(
            self.store.clone(),
            self.gateway.clone(),
            self.catalog.clone(),
            Arc::new(self.card_manager()),
        )
    }

    pub fn webhook_processor(&self) -> WebhookProcessor {
        WebhookProcessor::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.hooks.clone(),
            self.catalog.clone(),
            self.settings.clone(),
        )
    }

    /// Load the authenticated user's record. The id comes from auth
    /// middleware, so a missing record is an invariant violation.
    async fn load_user(&self, user_id: &str) -> Result<UserRecord, BillingApiError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(BillingError::from)?
            .ok_or_else(|| {
                BillingError::Store(format!("authenticated user {} has no record", user_id))
            })?;
        Ok(user)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context (comes from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// The reverse proxy authenticates the session and forwards the user id in
/// an X-User-Id header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .ok_or(AuthenticationRequired)?;

            Ok(AuthenticatedUser {
                user_id: user_id.to_string(),
            })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing - Full billing snapshot for the account page
pub async fn get_billing_snapshot(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let snapshot = state
        .snapshot_builder()
        .build(&user.user_id, SnapshotContext::Account, true)
        .await?;
    Ok(Json(snapshot))
}

/// GET /billing/chooseplan - Snapshot for the plan selection page
pub async fn get_choose_plan(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let snapshot = state
        .snapshot_builder()
        .build(&user.user_id, SnapshotContext::ChoosePage, false)
        .await?;
    Ok(Json(snapshot))
}

/// GET /billing/testcoupon?code= - Validate a coupon code
pub async fn test_coupon(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Query(params): Query<CouponParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let check = state.reconciler().check_coupon(&params.code);
    Ok(Json(CouponCheckResponse::from(check)))
}

/// GET /billing/setupintent - Mint a setup intent for client-side card entry
pub async fn create_setup_intent(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let client_secret = state.reconciler().create_setup_intent().await?;
    Ok(Json(SetupIntentResponse { client_secret }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/upgrade - Subscribe to or move to a plan
pub async fn upgrade(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpgradeRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = SubscribeCommand {
        user_id: user.user_id,
        plan_id: request.plan_id.clone(),
        coupon: request.coupon.clone(),
        card: request.credential(),
    };

    let outcome = state.reconciler().subscribe(cmd).await?;

    Ok(Json(UpgradeResponse::from(outcome)))
}

/// POST /billing/card - Store a new card
pub async fn add_card(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<AddCardRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let credential = request
        .credential()
        .ok_or(BillingApiError::BadRequest("a card token or payment method id is required"))?;

    let record = state.load_user(&user.user_id).await?;
    state.card_manager().ensure_customer(&record, &credential).await?;

    Ok(Json(EmptyResponse {}))
}

/// GET /billing/removecard?id= - Detach a stored card
pub async fn remove_card(
    State(state): State<BillingAppState>,
    _user: AuthenticatedUser,
    Query(params): Query<CardIdParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    state.card_manager().remove_card(&params.id).await?;
    Ok(Redirect::to(&state.settings.account_path))
}

/// GET /billing/setcarddefault?id= - Make a stored card the invoice default
pub async fn set_default_card(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(params): Query<CardIdParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let record = state.load_user(&user.user_id).await?;
    state
        .card_manager()
        .set_default_card(&record, &params.id)
        .await?;
    Ok(Redirect::to(&state.settings.account_path))
}

/// GET /billing/cancelsubscription - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    state.reconciler().cancel_at_period_end(&user.user_id).await?;
    Ok(Redirect::to(&state.settings.account_path))
}

/// GET /billing/resumesubscription - Clear a pending cancellation
pub async fn resume_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    state.reconciler().resume(&user.user_id).await?;
    Ok(Redirect::to(&state.settings.account_path))
}

/// POST /billing/webhook - Handle provider webhook deliveries
///
/// Only the event id is taken from the body; the processor re-fetches the
/// event from the provider before acting on it.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    if let Some(verifier) = &state.webhook_verifier {
        let signature = headers
            .get("Stripe-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(BillingApiError::InvalidSignature)?;
        verifier
            .verify(signature, &body)
            .map_err(|err| {
                tracing::warn!(error = %err, "webhook signature rejected");
                BillingApiError::InvalidSignature
            })?;
    }

    let request: WebhookRequest = serde_json::from_slice(&body)
        .map_err(|_| BillingApiError::BadRequest("webhook body must carry an event id"))?;

    state.webhook_processor().handle(&request.id).await?;

    Ok(Json(WebhookAck { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub enum BillingApiError {
    Billing(BillingError),
    InvalidSignature,
    BadRequest(&'static str),
}

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            BillingApiError::Billing(err) => {
                if let Some(detail) = err.detail() {
                    tracing::error!(detail = %detail, "billing operation failed");
                }
                let (status, code) = match err {
                    BillingError::PaymentRequired => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
                    BillingError::PaymentMethodRejected => {
                        (StatusCode::PAYMENT_REQUIRED, "CARD_REJECTED")
                    }
                    BillingError::TransactionIncomplete => {
                        (StatusCode::PAYMENT_REQUIRED, "TRANSACTION_INCOMPLETE")
                    }
                    BillingError::InvalidPlan => (StatusCode::BAD_REQUEST, "INVALID_PLAN"),
                    BillingError::ProvisioningFailed => {
                        (StatusCode::BAD_GATEWAY, "PROVISIONING_FAILED")
                    }
                    BillingError::Gateway(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE"),
                    BillingError::Unknown => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
                    BillingError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                (status, code, err.to_string())
            }
            BillingApiError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "INVALID_WEBHOOK_SIGNATURE",
                "Webhook signature verification failed".to_string(),
            ),
            BillingApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", (*message).to_string())
            }
        };

        let body = ErrorResponse::new(code, message);
        (status, Json(body)).into_response()
    }
}
