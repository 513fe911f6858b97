//! Shared test doubles for the billing handlers.
//!
//! Hand-rolled port implementations: an in-memory user store, a scriptable
//! payment gateway that records every call, and recording notifier/hook
//! impls. Tests configure the fields they care about and leave the rest at
//! their defaults.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::billing::ProviderEvent;
use crate::ports::{
    BillingHooks, CardCredential, CreateSubscriptionRequest, GatewayCustomer, GatewayError,
    Notifier, NotifyError, PaymentGateway, PaymentIntent, PaymentMethodInfo, RemoteInvoice,
    RemoteSubscription, StoreError, UpdateSubscriptionRequest, UserRecord, UserStore,
};

/// In-memory user store keyed by user id.
#[derive(Default)]
pub(crate) struct InMemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
    saves: Mutex<Vec<UserRecord>>,
}

impl InMemoryUserStore {
    pub fn with_user(user: UserRecord) -> Self {
        let store = Self::default();
        store
            .users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user);
        store
    }

    /// Every record passed to `save`, in order.
    pub fn saves(&self) -> Vec<UserRecord> {
        self.saves.lock().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<UserRecord> {
        self.users.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.billing.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.saves.lock().unwrap().push(user.clone());
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

/// Scriptable gateway. Unconfigured lookups return `NotFound`; every call
/// is recorded by method name.
#[derive(Default)]
pub(crate) struct MockGateway {
    pub calls: Mutex<Vec<&'static str>>,

    pub events: Mutex<HashMap<String, ProviderEvent>>,
    pub customer: Mutex<Option<GatewayCustomer>>,
    pub payment_methods: Mutex<Vec<PaymentMethodInfo>>,
    pub invoices: Mutex<Vec<RemoteInvoice>>,
    pub upcoming: Mutex<Option<Result<RemoteInvoice, GatewayError>>>,
    pub subscriptions: Mutex<HashMap<String, RemoteSubscription>>,
    pub setup_intent: Mutex<Option<PaymentIntent>>,

    pub create_customer_result: Mutex<Option<Result<String, GatewayError>>>,
    pub create_subscription_result: Mutex<Option<Result<RemoteSubscription, GatewayError>>>,
    pub update_subscription_result: Mutex<Option<Result<RemoteSubscription, GatewayError>>>,

    pub last_create_request: Mutex<Option<CreateSubscriptionRequest>>,
    pub last_update_request: Mutex<Option<UpdateSubscriptionRequest>>,
}

impl MockGateway {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn retrieve_event(&self, event_id: &str) -> Result<ProviderEvent, GatewayError> {
        self.record("retrieve_event");
        self.events
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("event {}", event_id)))
    }

    async fn create_customer(
        &self,
        _email: &str,
        _credential: &CardCredential,
    ) -> Result<String, GatewayError> {
        self.record("create_customer");
        self.create_customer_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok("cus_new".to_string()))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<GatewayCustomer, GatewayError> {
        self.record("retrieve_customer");
        self.customer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::NotFound(format!("customer {}", customer_id)))
    }

    async fn attach_payment_method(
        &self,
        _payment_method_id: &str,
        _customer_id: &str,
    ) -> Result<(), GatewayError> {
        self.record("attach_payment_method");
        Ok(())
    }

    async fn set_default_payment_method(
        &self,
        _customer_id: &str,
        _payment_method_id: &str,
    ) -> Result<(), GatewayError> {
        self.record("set_default_payment_method");
        Ok(())
    }

    async fn replace_default_source(
        &self,
        _customer_id: &str,
        _card_token: &str,
    ) -> Result<(), GatewayError> {
        self.record("replace_default_source");
        Ok(())
    }

    async fn detach_payment_method(&self, _payment_method_id: &str) -> Result<(), GatewayError> {
        self.record("detach_payment_method");
        Ok(())
    }

    async fn list_card_payment_methods(
        &self,
        _customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError> {
        self.record("list_card_payment_methods");
        Ok(self.payment_methods.lock().unwrap().clone())
    }

    async fn create_setup_intent(&self) -> Result<PaymentIntent, GatewayError> {
        self.record("create_setup_intent");
        self.setup_intent
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Provider("no setup intent configured".to_string()))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, GatewayError> {
        self.record("retrieve_subscription");
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("subscription {}", subscription_id)))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError> {
        self.record("create_subscription");
        *self.last_create_request.lock().unwrap() = Some(request);
        self.create_subscription_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(GatewayError::Provider("no create result configured".to_string())))
    }

    async fn update_subscription_plan(
        &self,
        request: UpdateSubscriptionRequest,
    ) -> Result<RemoteSubscription, GatewayError> {
        self.record("update_subscription_plan");
        *self.last_update_request.lock().unwrap() = Some(request);
        self.update_subscription_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(GatewayError::Provider("no update result configured".to_string())))
    }

    async fn set_cancel_at_period_end(
        &self,
        _subscription_id: &str,
        _cancel: bool,
    ) -> Result<(), GatewayError> {
        self.record("set_cancel_at_period_end");
        Ok(())
    }

    async fn list_invoices(
        &self,
        _customer_id: &str,
        _limit: u32,
    ) -> Result<Vec<RemoteInvoice>, GatewayError> {
        self.record("list_invoices");
        Ok(self.invoices.lock().unwrap().clone())
    }

    async fn upcoming_invoice(&self, customer_id: &str) -> Result<RemoteInvoice, GatewayError> {
        self.record("upcoming_invoice");
        self.upcoming
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(GatewayError::NotFound(format!("upcoming for {}", customer_id))))
    }
}

/// Notifier that records every message.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((
            subject.to_string(),
            body.to_string(),
            recipient.to_string(),
        ));
        Ok(())
    }
}

/// Hooks that record their invocations.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    pub upgrades: Mutex<Vec<(String, String)>>,
    pub changes: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn upgrades(&self) -> Vec<(String, String)> {
        self.upgrades.lock().unwrap().clone()
    }

    pub fn changes(&self) -> Vec<String> {
        self.changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingHooks for RecordingHooks {
    async fn on_upgrade(&self, user: &UserRecord, plan_id: &str) {
        self.upgrades
            .lock()
            .unwrap()
            .push((user.id.clone(), plan_id.to_string()));
    }

    async fn on_subscription_change(&self, user: &UserRecord) {
        self.changes.lock().unwrap().push(user.id.clone());
    }
}
