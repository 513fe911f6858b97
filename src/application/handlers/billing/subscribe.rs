//! SubscriptionReconciler - plan changes and the SCA handshake.
//!
//! `subscribe` is the write path both for first subscriptions and plan
//! changes. The local record is written optimistically right after the
//! provider call succeeds; webhook events correct any drift afterwards.

use std::sync::Arc;

use crate::config::BillingCatalog;
use crate::domain::billing::{
    resolve_subscription_intent, AuthAction, AuthRequirement, BillingError, SubscriptionItemRef,
};
use crate::ports::{
    CardCredential, CreateSubscriptionRequest, PaymentGateway, StoreError,
    UpdateSubscriptionRequest, UserRecord, UserStore,
};

use super::payment_methods::PaymentMethodManager;

/// Command to subscribe a user to a plan (or move them to a new one).
#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub user_id: String,
    pub plan_id: String,
    pub coupon: Option<String>,
    pub card: Option<CardCredential>,
}

/// Result of a subscribe operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Payment settled; nothing left to do.
    Completed,

    /// The client must drive the provider's authentication challenge.
    AuthenticationRequired {
        action: AuthAction,
        client_secret: String,
    },
}

impl From<AuthRequirement> for SubscribeOutcome {
    fn from(requirement: AuthRequirement) -> Self {
        match requirement {
            AuthRequirement::None => SubscribeOutcome::Completed,
            AuthRequirement::ActionRequired {
                action,
                client_secret,
            } => SubscribeOutcome::AuthenticationRequired {
                action,
                client_secret,
            },
        }
    }
}

/// Result of checking a coupon code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponCheck {
    pub valid: bool,
    pub description: Option<String>,
}

/// Handler for subscription lifecycle operations.
pub struct SubscriptionReconciler {
    store: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<BillingCatalog>,
    cards: Arc<PaymentMethodManager>,
}

impl SubscriptionReconciler {
    pub fn new(
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<BillingCatalog>,
        cards: Arc<PaymentMethodManager>,
    ) -> Self {
        Self {
            store,
            gateway,
            catalog,
            cards,
        }
    }

    /// Subscribe the user to a plan.
    ///
    /// Creates the provider customer from a supplied card when the user has
    /// none, then creates or re-points the remote subscription, writes the
    /// local mirror, and resolves any pending authentication intent into a
    /// client action.
    pub async fn subscribe(&self, cmd: SubscribeCommand) -> Result<SubscribeOutcome, BillingError> {
        let mut user = self.load(&cmd.user_id).await?;

        if user.billing.customer_id.is_none() && cmd.card.is_none() {
            return Err(BillingError::PaymentRequired);
        }

        let customer_id = match &cmd.card {
            Some(card) => {
                let id = self.cards.ensure_customer(&user, card).await?;
                user.billing.customer_id = Some(id.clone());
                id
            }
            // Checked above.
            None => user
                .billing
                .customer_id
                .clone()
                .ok_or(BillingError::PaymentRequired)?,
        };

        let plan = self
            .catalog
            .plans
            .find(&cmd.plan_id)
            .filter(|plan| !plan.is_free())
            .ok_or(BillingError::InvalidPlan)?;

        let coupon = cmd.coupon.as_deref().and_then(|code| {
            let found = self.catalog.find_coupon(code);
            if found.is_none() {
                tracing::debug!(code = %code, "dropping unknown coupon code");
            }
            found.map(|c| c.code.clone())
        });

        let remote = match user.billing.subscription_id.clone() {
            None => {
                self.gateway
                    .create_subscription(CreateSubscriptionRequest {
                        customer_id: customer_id.clone(),
                        provider_plan_id: plan.provider_plan_id.clone(),
                        plan_id: plan.id.clone(),
                        coupon,
                    })
                    .await
            }
            Some(subscription_id) => {
                let item_id = self.first_item_id(&user, &subscription_id).await?;
                self.gateway
                    .update_subscription_plan(UpdateSubscriptionRequest {
                        subscription_id,
                        item_id,
                        provider_plan_id: plan.provider_plan_id.clone(),
                        plan_id: plan.id.clone(),
                        coupon,
                    })
                    .await
            }
        }
        .map_err(|err| {
            tracing::error!(user_id = %user.id, plan_id = %plan.id, error = %err, "subscription provisioning failed");
            BillingError::ProvisioningFailed
        })?;

        // Optimistic write; customer.subscription.updated corrects drift.
        user.plan = plan.id.clone();
        user.billing.subscription_id = Some(remote.id.clone());
        user.billing.subscription_items = remote
            .items
            .iter()
            .map(|item| SubscriptionItemRef {
                id: item.id.clone(),
                plan: item.plan.clone(),
            })
            .collect();
        user.billing.canceled = remote.cancel_at_period_end;
        if user.billing.tracks_status() {
            user.billing.subscription_status = Some(remote.status.clone());
        }
        self.store.save(&user).await?;

        let requirement = resolve_subscription_intent(&remote)?;
        Ok(requirement.into())
    }

    /// Flag the subscription to cancel at the end of the current period.
    /// No-op when the user has no subscription.
    pub async fn cancel_at_period_end(&self, user_id: &str) -> Result<(), BillingError> {
        self.set_cancel_flag(user_id, true).await
    }

    /// Remove the deferred-cancellation flag.
    pub async fn resume(&self, user_id: &str) -> Result<(), BillingError> {
        self.set_cancel_flag(user_id, false).await
    }

    /// Check a coupon code against the configured list.
    pub fn check_coupon(&self, code: &str) -> CouponCheck {
        match self.catalog.find_coupon(code) {
            Some(coupon) => CouponCheck {
                valid: true,
                description: Some(coupon.description.clone()),
            },
            None => CouponCheck {
                valid: false,
                description: None,
            },
        }
    }

    /// Create an off-session setup intent; returns its client secret.
    pub async fn create_setup_intent(&self) -> Result<String, BillingError> {
        let intent = self.gateway.create_setup_intent().await?;
        Ok(intent.client_secret)
    }

    async fn set_cancel_flag(&self, user_id: &str, cancel: bool) -> Result<(), BillingError> {
        let mut user = self.load(user_id).await?;

        let subscription_id = match user.billing.subscription_id.clone() {
            Some(id) => id,
            None => {
                tracing::debug!(user_id = %user_id, "no subscription to cancel or resume");
                return Ok(());
            }
        };

        self.gateway
            .set_cancel_at_period_end(&subscription_id, cancel)
            .await?;
        user.billing.canceled = cancel;
        self.store.save(&user).await?;
        Ok(())
    }

    /// Id of the subscription's first billed item, from the local mirror or
    /// a fresh fetch when the mirror is empty.
    async fn first_item_id(
        &self,
        user: &UserRecord,
        subscription_id: &str,
    ) -> Result<String, BillingError> {
        if let Some(item) = user.billing.subscription_items.first() {
            return Ok(item.id.clone());
        }

        let remote = self
            .gateway
            .retrieve_subscription(subscription_id)
            .await
            .map_err(|err| {
                tracing::error!(subscription_id = %subscription_id, error = %err, "failed to fetch subscription items");
                BillingError::ProvisioningFailed
            })?;
        remote
            .items
            .first()
            .map(|item| item.id.clone())
            .ok_or(BillingError::ProvisioningFailed)
    }

    async fn load(&self, user_id: &str) -> Result<UserRecord, BillingError> {
        Ok(self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?)
    }
}
