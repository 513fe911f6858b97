//! WebhookProcessor - provider event dispatch.
//!
//! Events are re-fetched by id from the provider before any state is read;
//! the delivered payload is never trusted. Every transition is an idempotent
//! assignment, so redelivered events converge to the same final state.
//! Notification failures never abort a transition.

use std::sync::Arc;

use crate::config::{BillingCatalog, BillingConfig};
use crate::domain::billing::{
    entitled_plan, BillingError, ProviderEvent, ProviderEventType, SubscriptionEventData,
    FREE_PLAN_ID,
};
use crate::ports::{BillingHooks, Notifier, PaymentGateway, UserRecord, UserStore};

/// Handler for provider webhook events.
pub struct WebhookProcessor {
    store: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    hooks: Arc<dyn BillingHooks>,
    catalog: Arc<BillingCatalog>,
    settings: Arc<BillingConfig>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        hooks: Arc<dyn BillingHooks>,
        catalog: Arc<BillingCatalog>,
        settings: Arc<BillingConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            hooks,
            catalog,
            settings,
        }
    }

    /// Process one webhook delivery, identified by event id.
    pub async fn handle(&self, event_id: &str) -> Result<(), BillingError> {
        let event = self.gateway.retrieve_event(event_id).await?;
        let event_type = event.parsed_type();
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "processing provider event");

        match event_type {
            ProviderEventType::TrialWillEnd => self.trial_will_end(&event).await,
            ProviderEventType::SourceExpiring | ProviderEventType::InvoicePaymentFailed => {
                // The provider notifies the user and runs its own dunning.
                Ok(())
            }
            ProviderEventType::InvoicePaymentSucceeded => self.payment_succeeded(&event).await,
            ProviderEventType::SubscriptionUpdated => self.subscription_updated(&event).await,
            ProviderEventType::SubscriptionDeleted => self.subscription_deleted(&event).await,
            ProviderEventType::Unknown => {
                tracing::debug!(event_type = %event.event_type, "ignoring unrecognized event type");
                Ok(())
            }
        }
    }

    async fn trial_will_end(&self, event: &ProviderEvent) -> Result<(), BillingError> {
        let Some(data) = self.subscription_payload(event) else {
            return Ok(());
        };
        let user = self.user_for_customer(&data.customer).await?;

        let subject = format!("Your {} trial is ending soon", self.settings.site_name);
        let body = format!(
            "Your {} trial ends in a few days. Add a payment method to keep your plan.",
            self.settings.site_name
        );
        self.notify(&user, &subject, &body).await;
        Ok(())
    }

    async fn payment_succeeded(&self, event: &ProviderEvent) -> Result<(), BillingError> {
        let invoice = match event.invoice_data() {
            Ok(invoice) => invoice,
            Err(err) => {
                tracing::warn!(event_id = %event.id, error = %err, "malformed invoice payload");
                return Ok(());
            }
        };

        // Renewal invoices are routine; only create/update gets a mail.
        if !invoice.is_subscription_change() {
            return Ok(());
        }
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            tracing::debug!(event_id = %event.id, "invoice carries no subscription");
            return Ok(());
        };

        let remote = self.gateway.retrieve_subscription(subscription_id).await?;
        let user = self.user_for_customer(&invoice.customer).await?;

        let plan_id = remote.plan_id.unwrap_or_else(|| user.plan.clone());
        self.hooks.on_upgrade(&user, &plan_id).await;

        let plan_name = self
            .catalog
            .plans
            .find(&plan_id)
            .map(|plan| plan.name.clone())
            .unwrap_or_else(|| plan_id.clone());
        let subject = format!("Thank you for upgrading to {}", plan_name);
        let body = format!(
            "Your payment went through and your {} plan on {} is active.",
            plan_name, self.settings.site_name
        );
        self.notify(&user, &subject, &body).await;
        Ok(())
    }

    async fn subscription_updated(&self, event: &ProviderEvent) -> Result<(), BillingError> {
        let Some(data) = self.subscription_payload(event) else {
            return Ok(());
        };
        let mut user = self.user_for_customer(&data.customer).await?;

        if let Some(status) = &data.status {
            if user.billing.tracks_status() {
                user.billing.subscription_status = Some(status.clone());
            }
            let plan_id = data
                .metadata
                .plan_id
                .clone()
                .unwrap_or_else(|| user.plan.clone());
            user.plan = entitled_plan(&plan_id, status);
        }

        self.hooks.on_subscription_change(&user).await;
        self.store.save(&user).await?;
        Ok(())
    }

    async fn subscription_deleted(&self, event: &ProviderEvent) -> Result<(), BillingError> {
        let Some(data) = self.subscription_payload(event) else {
            return Ok(());
        };
        let mut user = self.user_for_customer(&data.customer).await?;

        user.plan = FREE_PLAN_ID.to_string();
        user.billing.clear_subscription();
        if user.billing.tracks_status() {
            if let Some(status) = &data.status {
                user.billing.subscription_status = Some(status.clone());
            }
        }
        self.store.save(&user).await?;

        let subject = format!("Your {} subscription was canceled", self.settings.site_name);
        let mut body = format!(
            "Your subscription on {} has ended and your account is back on the free plan.",
            self.settings.site_name
        );
        if let Some(extra) = &self.settings.cancel_mail_extra {
            body.push_str("\n\n");
            body.push_str(extra);
        }
        self.notify(&user, &subject, &body).await;
        Ok(())
    }

    fn subscription_payload(&self, event: &ProviderEvent) -> Option<SubscriptionEventData> {
        match event.subscription_data() {
            Ok(data) => Some(data),
            Err(err) => {
                tracing::warn!(event_id = %event.id, error = %err, "malformed subscription payload");
                None
            }
        }
    }

    /// A customer id arriving in a provider event must map to a user; a
    /// miss means local and remote state have diverged.
    async fn user_for_customer(&self, customer_id: &str) -> Result<UserRecord, BillingError> {
        self.store
            .find_by_customer_id(customer_id)
            .await?
            .ok_or_else(|| BillingError::Store(format!("no user for customer {}", customer_id)))
    }

    async fn notify(&self, user: &UserRecord, subject: &str, body: &str) {
        if let Err(err) = self.notifier.send(subject, body, &user.email).await {
            tracing::warn!(user_id = %user.id, error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::{
        InMemoryUserStore, MockGateway, RecordingHooks, RecordingNotifier,
    };
    use crate::domain::billing::{
        Plan, PlanCatalog, ProviderEventBuilder, SubscriptionItemRef, SubscriptionStatus,
    };
    use crate::ports::RemoteSubscription;
    use serde_json::json;

    fn catalog() -> Arc<BillingCatalog> {
        Arc::new(BillingCatalog {
            plans: PlanCatalog::new(vec![
                Plan {
                    id: "free".to_string(),
                    provider_plan_id: String::new(),
                    name: "Free".to_string(),
                    order: 0,
                },
                Plan {
                    id: "pro".to_string(),
                    provider_plan_id: "price_pro".to_string(),
                    name: "Pro".to_string(),
                    order: 1,
                },
            ]),
            coupons: Vec::new(),
        })
    }

    fn settings() -> Arc<BillingConfig> {
        Arc::new(BillingConfig {
            site_name: "Example".to_string(),
            account_path: "/account#billing".to_string(),
            catalog_path: "catalog.yaml".to_string(),
            show_draft_invoice: false,
            allow_no_upgrade: false,
            cancel_mail_extra: Some("You can come back any time.".to_string()),
        })
    }

    struct Fixture {
        store: Arc<InMemoryUserStore>,
        gateway: Arc<MockGateway>,
        notifier: Arc<RecordingNotifier>,
        hooks: Arc<RecordingHooks>,
        processor: WebhookProcessor,
    }

    fn fixture(user: UserRecord) -> Fixture {
        let store = Arc::new(InMemoryUserStore::with_user(user));
        let gateway = Arc::new(MockGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let hooks = Arc::new(RecordingHooks::default());
        let processor = WebhookProcessor::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            hooks.clone(),
            catalog(),
            settings(),
        );
        Fixture {
            store,
            gateway,
            notifier,
            hooks,
            processor,
        }
    }

    fn subscribed_user(tracking: bool) -> UserRecord {
        let mut user = UserRecord::new("u1", "u1@example.com");
        user.plan = "pro".to_string();
        user.billing.customer_id = Some("cus_1".to_string());
        user.billing.subscription_id = Some("sub_1".to_string());
        user.billing.subscription_items = vec![SubscriptionItemRef {
            id: "si_1".to_string(),
            plan: "price_pro".to_string(),
        }];
        if tracking {
            user.billing.subscription_status = Some(SubscriptionStatus::Active);
        }
        user
    }

    fn insert_event(fixture: &Fixture, event_type: &str, object: serde_json::Value) {
        let event = ProviderEventBuilder::new()
            .id("evt_1")
            .event_type(event_type)
            .object(object)
            .build();
        fixture
            .gateway
            .events
            .lock()
            .unwrap()
            .insert("evt_1".to_string(), event);
    }

    #[tokio::test]
    async fn unknown_event_type_is_acknowledged() {
        let f = fixture(subscribed_user(false));
        insert_event(&f, "charge.refunded", json!({}));

        f.processor.handle("evt_1").await.unwrap();
        assert!(f.store.saves().is_empty());
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unfetchable_event_fails() {
        let f = fixture(subscribed_user(false));
        let result = f.processor.handle("evt_missing").await;
        assert!(matches!(result, Err(BillingError::Gateway(_))));
    }

    #[tokio::test]
    async fn trial_ending_sends_notification_only() {
        let f = fixture(subscribed_user(false));
        insert_event(
            &f,
            "customer.subscription.trial_will_end",
            json!({ "customer": "cus_1", "status": "trialing" }),
        );

        f.processor.handle("evt_1").await.unwrap();

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("trial is ending"));
        assert_eq!(sent[0].2, "u1@example.com");
        assert!(f.store.saves().is_empty());
    }

    #[tokio::test]
    async fn payment_failed_is_a_no_op() {
        let f = fixture(subscribed_user(false));
        insert_event(&f, "invoice.payment_failed", json!({ "customer": "cus_1" }));

        f.processor.handle("evt_1").await.unwrap();
        assert!(f.store.saves().is_empty());
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn upgrade_invoice_triggers_hook_and_mail() {
        let f = fixture(subscribed_user(false));
        f.gateway.subscriptions.lock().unwrap().insert(
            "sub_1".to_string(),
            RemoteSubscription {
                id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                status: SubscriptionStatus::Active,
                items: Vec::new(),
                current_period_start: 0,
                current_period_end: 0,
                cancel_at_period_end: false,
                plan_amount: None,
                plan_currency: None,
                product_name: None,
                unit_label: None,
                discount: None,
                plan_id: Some("pro".to_string()),
                pending_setup_intent: None,
                latest_invoice: None,
            },
        );
        insert_event(
            &f,
            "invoice.payment_succeeded",
            json!({
                "billing_reason": "subscription_create",
                "customer": "cus_1",
                "subscription": "sub_1"
            }),
        );

        f.processor.handle("evt_1").await.unwrap();

        assert_eq!(f.hooks.upgrades(), vec![("u1".to_string(), "pro".to_string())]);
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Thank you for upgrading to Pro"));
        // Confirmation only; no field mutation.
        assert!(f.store.saves().is_empty());
    }

    #[tokio::test]
    async fn renewal_invoice_is_ignored() {
        let f = fixture(subscribed_user(false));
        insert_event(
            &f,
            "invoice.payment_succeeded",
            json!({
                "billing_reason": "subscription_cycle",
                "customer": "cus_1",
                "subscription": "sub_1"
            }),
        );

        f.processor.handle("evt_1").await.unwrap();
        assert!(f.hooks.upgrades().is_empty());
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn subscription_update_decays_plan_when_access_is_lost() {
        let f = fixture(subscribed_user(true));
        insert_event(
            &f,
            "customer.subscription.updated",
            json!({
                "customer": "cus_1",
                "status": "unpaid",
                "metadata": { "planId": "pro" }
            }),
        );

        f.processor.handle("evt_1").await.unwrap();

        let user = f.store.get("u1").unwrap();
        assert_eq!(user.plan, "free");
        assert_eq!(
            user.billing.subscription_status,
            Some(SubscriptionStatus::Unpaid)
        );
        assert_eq!(f.hooks.changes(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn subscription_update_keeps_plan_while_entitled() {
        let f = fixture(subscribed_user(true));
        insert_event(
            &f,
            "customer.subscription.updated",
            json!({
                "customer": "cus_1",
                "status": "past_due",
                "metadata": { "planId": "pro" }
            }),
        );

        f.processor.handle("evt_1").await.unwrap();

        let user = f.store.get("u1").unwrap();
        assert_eq!(user.plan, "pro");
        assert_eq!(
            user.billing.subscription_status,
            Some(SubscriptionStatus::PastDue)
        );
    }

    #[tokio::test]
    async fn status_is_not_tracked_when_tracking_is_off() {
        let f = fixture(subscribed_user(false));
        insert_event(
            &f,
            "customer.subscription.updated",
            json!({ "customer": "cus_1", "status": "active" }),
        );

        f.processor.handle("evt_1").await.unwrap();

        let user = f.store.get("u1").unwrap();
        assert_eq!(user.billing.subscription_status, None);
    }

    #[tokio::test]
    async fn subscription_deleted_resets_to_free_and_mails() {
        let f = fixture(subscribed_user(true));
        insert_event(
            &f,
            "customer.subscription.deleted",
            json!({ "customer": "cus_1", "status": "canceled" }),
        );

        f.processor.handle("evt_1").await.unwrap();

        let user = f.store.get("u1").unwrap();
        assert_eq!(user.plan, "free");
        assert_eq!(user.billing.subscription_id, None);
        assert!(user.billing.subscription_items.is_empty());
        assert!(!user.billing.canceled);
        // The card stays on file.
        assert_eq!(user.billing.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(
            user.billing.subscription_status,
            Some(SubscriptionStatus::Canceled)
        );

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("You can come back any time."));
    }

    #[tokio::test]
    async fn subscription_deleted_is_idempotent() {
        let f = fixture(subscribed_user(true));
        insert_event(
            &f,
            "customer.subscription.deleted",
            json!({ "customer": "cus_1", "status": "canceled" }),
        );

        f.processor.handle("evt_1").await.unwrap();
        let after_first = f.store.get("u1").unwrap();

        f.processor.handle("evt_1").await.unwrap();
        assert_eq!(f.store.get("u1").unwrap(), after_first);
    }

    #[tokio::test]
    async fn event_for_unknown_customer_is_fatal() {
        let f = fixture(subscribed_user(false));
        insert_event(
            &f,
            "customer.subscription.deleted",
            json!({ "customer": "cus_other", "status": "canceled" }),
        );

        let result = f.processor.handle("evt_1").await;
        assert!(matches!(result, Err(BillingError::Store(_))));
    }
}
