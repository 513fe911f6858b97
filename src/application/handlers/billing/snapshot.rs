//! SnapshotBuilder - read-only projection of a user's billing state.
//!
//! Fetches remote state live on every request and projects it into the
//! derived view records. A user without a provider customer gets an empty
//! snapshot with zero remote calls.

use std::sync::Arc;

use crate::config::{BillingCatalog, BillingConfig};
use crate::domain::billing::{
    describe_discount, format_period_date, format_usd, BillingError, BillingSnapshot, InvoiceView,
    PaymentMethodView, Plan, PlanCatalog, PlanComparison, PlanOption, SnapshotContext,
    SubscriptionView,
};
use crate::ports::{
    PaymentGateway, RemoteInvoice, RemoteSubscription, StoreError, UserStore,
};

/// How many past invoices a snapshot includes.
const INVOICE_LIMIT: u32 = 5;

/// Handler building the billing snapshot.
pub struct SnapshotBuilder {
    store: Arc<dyn UserStore>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<BillingCatalog>,
    settings: Arc<BillingConfig>,
}

impl SnapshotBuilder {
    pub fn new(
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<BillingCatalog>,
        settings: Arc<BillingConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            catalog,
            settings,
        }
    }

    /// Build a snapshot for the given user.
    pub async fn build(
        &self,
        user_id: &str,
        context: SnapshotContext,
        include_invoices: bool,
    ) -> Result<BillingSnapshot, BillingError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let current_plan = self.catalog.plans.find(&user.plan);
        let upgradable_plans = self.plan_options(current_plan, context);

        let customer_id = match &user.billing.customer_id {
            Some(id) => id.clone(),
            None => {
                return Ok(BillingSnapshot::empty_remote(
                    current_plan.cloned(),
                    upgradable_plans,
                ))
            }
        };

        let (customer, methods) = tokio::try_join!(
            self.gateway.retrieve_customer(&customer_id),
            self.gateway.list_card_payment_methods(&customer_id),
        )?;

        let default_method = customer
            .default_payment_method
            .clone()
            .or_else(|| customer.default_source.clone());
        let payment_methods = methods
            .into_iter()
            .map(|m| PaymentMethodView {
                is_default: default_method.as_deref() == Some(m.id.as_str()),
                id: m.id,
                brand: m.brand,
                last4: m.last4,
                exp_month: m.exp_month,
                exp_year: m.exp_year,
            })
            .collect();

        let subscriptions = customer
            .subscriptions
            .iter()
            .map(subscription_view)
            .collect();

        let invoices = if include_invoices {
            self.invoice_views(&customer_id).await?
        } else {
            Vec::new()
        };

        Ok(BillingSnapshot {
            user_plan: current_plan.cloned(),
            upgradable_plans,
            payment_methods,
            subscriptions,
            invoices,
        })
    }

    /// Plans the user could move to, annotated against their current plan.
    ///
    /// The choose-plan page offers everything except the current plan, with
    /// the free plan included only when staying unpaid is allowed. The
    /// account-page upgrade modal never offers the free plan.
    fn plan_options(&self, current: Option<&Plan>, context: SnapshotContext) -> Vec<PlanOption> {
        self.catalog
            .plans
            .plans()
            .iter()
            .filter(|plan| {
                if Some(plan.id.as_str()) == current.map(|c| c.id.as_str()) {
                    return false;
                }
                if plan.is_free() {
                    return context == SnapshotContext::ChoosePage && self.settings.allow_no_upgrade;
                }
                true
            })
            .map(|plan| {
                let (is_higher, is_lower) = match current {
                    Some(current) => match PlanCatalog::compare(plan, current) {
                        PlanComparison::Higher => (true, false),
                        PlanComparison::Lower => (false, true),
                        PlanComparison::Equal => (false, false),
                    },
                    None => (false, false),
                };
                PlanOption {
                    plan: plan.clone(),
                    is_higher,
                    is_lower,
                }
            })
            .collect()
    }

    async fn invoice_views(&self, customer_id: &str) -> Result<Vec<InvoiceView>, BillingError> {
        let mut invoices = self.gateway.list_invoices(customer_id, INVOICE_LIMIT).await?;

        if self.settings.show_draft_invoice {
            // Best effort only; there is no upcoming invoice for customers
            // without a subscription and the provider answers with an error.
            match self.gateway.upcoming_invoice(customer_id).await {
                Ok(draft) => invoices.insert(0, draft),
                Err(err) => {
                    tracing::debug!(customer_id = %customer_id, error = %err, "no upcoming invoice")
                }
            }
        }

        Ok(invoices
            .into_iter()
            .filter(|invoice| invoice.amount_due > 0)
            .map(invoice_view)
            .collect())
    }
}

fn subscription_view(subscription: &RemoteSubscription) -> SubscriptionView {
    let discount_description = subscription.discount.as_ref().map(|d| {
        describe_discount(
            &d.coupon.name,
            d.coupon.percent_off,
            d.coupon.amount_off,
            d.coupon.currency.as_deref(),
            d.coupon.duration_in_months,
        )
    });

    SubscriptionView {
        id: subscription.id.clone(),
        name: subscription.product_name.clone(),
        unit_label: subscription.unit_label.clone(),
        amount: subscription.plan_amount.map(format_usd),
        current_period_start: format_period_date(subscription.current_period_start),
        current_period_end: format_period_date(subscription.current_period_end),
        cancel_at_period_end: subscription.cancel_at_period_end,
        discount_description,
    }
}

fn invoice_view(invoice: RemoteInvoice) -> InvoiceView {
    // The invoice's own period is wrong for the first invoice of a
    // subscription; the first line item carries the real bounds.
    let period = invoice
        .lines
        .first()
        .map(|line| line.period)
        .unwrap_or_default();

    InvoiceView {
        id: invoice.id,
        amount: format_usd(invoice.amount_due),
        date: format_period_date(invoice.date),
        period_start: format_period_date(period.start),
        period_end: format_period_date(period.end),
        unpaid: invoice.attempt_count > 1 && !invoice.paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::{InMemoryUserStore, MockGateway};
    use crate::config::Coupon;
    use crate::domain::billing::{PlanCatalog, SubscriptionStatus};
    use crate::ports::{
        GatewayCustomer, GatewayError, PaymentMethodInfo, RemoteInvoiceLine, RemotePeriod,
        UserRecord,
    };

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
                Plan {
                    id: "team".to_string(),
                    provider_plan_id: "price_team".to_string(),
                    name: "Team".to_string(),
                    order: 2,
                },
            ]),
            coupons: vec![Coupon {
                code: "LAUNCH25".to_string(),
                description: "25% off".to_string(),
            }],
        })
    }

    fn settings(show_draft_invoice: bool, allow_no_upgrade: bool) -> Arc<BillingConfig> {
        Arc::new(BillingConfig {
            site_name: "Example".to_string(),
            account_path: "/account#billing".to_string(),
            catalog_path: "catalog.yaml".to_string(),
            show_draft_invoice,
            allow_no_upgrade,
            cancel_mail_extra: None,
        })
    }

    fn builder(
        store: Arc<InMemoryUserStore>,
        gateway: Arc<MockGateway>,
        settings_: Arc<BillingConfig>,
    ) -> SnapshotBuilder {
        SnapshotBuilder::new(store, gateway, catalog(), settings_)
    }

    fn pro_user(customer_id: Option<&str>) -> UserRecord {
        let mut user = UserRecord::new("u1", "u1@example.com");
        user.plan = "pro".to_string();
        user.billing.customer_id = customer_id.map(str::to_string);
        user
    }

    fn remote_customer() -> GatewayCustomer {
        GatewayCustomer {
            id: "cus_1".to_string(),
            default_payment_method: None,
            default_source: None,
            subscriptions: Vec::new(),
        }
    }

    fn card(id: &str) -> PaymentMethodInfo {
        PaymentMethodInfo {
            id: id.to_string(),
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
        }
    }

    #[tokio::test]
    async fn no_customer_means_empty_snapshot_and_zero_remote_calls() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(None)));
        let gateway = Arc::new(MockGateway::default());
        let builder = builder(store, gateway.clone(), settings(true, false));

        let snapshot = builder
            .build("u1", SnapshotContext::Account, true)
            .await
            .unwrap();

        assert!(snapshot.payment_methods.is_empty());
        assert!(snapshot.subscriptions.is_empty());
        assert!(snapshot.invoices.is_empty());
        assert_eq!(snapshot.user_plan.unwrap().id, "pro");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn account_context_excludes_free_and_current_plan() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(None)));
        let gateway = Arc::new(MockGateway::default());
        let builder = builder(store, gateway, settings(false, true));

        let snapshot = builder
            .build("u1", SnapshotContext::Account, false)
            .await
            .unwrap();

        let ids: Vec<&str> = snapshot
            .upgradable_plans
            .iter()
            .map(|p| p.plan.id.as_str())
            .collect();
        assert_eq!(ids, vec!["team"]);
    }

    #[tokio::test]
    async fn choose_page_includes_free_only_when_allowed() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(None)));
        let gateway = Arc::new(MockGateway::default());

        let with_free = builder(store.clone(), gateway.clone(), settings(false, true));
        let snapshot = with_free
            .build("u1", SnapshotContext::ChoosePage, false)
            .await
            .unwrap();
        let ids: Vec<&str> = snapshot
            .upgradable_plans
            .iter()
            .map(|p| p.plan.id.as_str())
            .collect();
        assert_eq!(ids, vec!["free", "team"]);

        let without_free = builder(store, gateway, settings(false, false));
        let snapshot = without_free
            .build("u1", SnapshotContext::ChoosePage, false)
            .await
            .unwrap();
        let ids: Vec<&str> = snapshot
            .upgradable_plans
            .iter()
            .map(|p| p.plan.id.as_str())
            .collect();
        assert_eq!(ids, vec!["team"]);
    }

    #[tokio::test]
    async fn plans_are_annotated_by_rank() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(None)));
        let gateway = Arc::new(MockGateway::default());
        let builder = builder(store, gateway, settings(false, true));

        let snapshot = builder
            .build("u1", SnapshotContext::ChoosePage, false)
            .await
            .unwrap();

        let free = snapshot
            .upgradable_plans
            .iter()
            .find(|p| p.plan.id == "free")
            .unwrap();
        assert!(free.is_lower && !free.is_higher);

        let team = snapshot
            .upgradable_plans
            .iter()
            .find(|p| p.plan.id == "team")
            .unwrap();
        assert!(team.is_higher && !team.is_lower);
    }

    #[tokio::test]
    async fn flags_exactly_the_default_payment_method() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(Some("cus_1"))));
        let gateway = Arc::new(MockGateway::default());
        let mut customer = remote_customer();
        // Legacy customers carry the default on default_source.
        customer.default_source = Some("pm_2".to_string());
        *gateway.customer.lock().unwrap() = Some(customer);
        *gateway.payment_methods.lock().unwrap() = vec![card("pm_1"), card("pm_2")];

        let builder = builder(store, gateway, settings(false, false));
        let snapshot = builder
            .build("u1", SnapshotContext::Account, false)
            .await
            .unwrap();

        let defaults: Vec<bool> = snapshot.payment_methods.iter().map(|m| m.is_default).collect();
        assert_eq!(defaults, vec![false, true]);
    }

    #[tokio::test]
    async fn formats_subscription_for_display() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(Some("cus_1"))));
        let gateway = Arc::new(MockGateway::default());
        let mut customer = remote_customer();
        customer.subscriptions = vec![RemoteSubscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
            items: Vec::new(),
            current_period_start: 1_583_107_200, // Mar 2, 2020
            current_period_end: 1_585_699_200,
            cancel_at_period_end: false,
            plan_amount: Some(1500),
            plan_currency: Some("usd".to_string()),
            product_name: Some("Pro".to_string()),
            unit_label: None,
            discount: None,
            plan_id: Some("pro".to_string()),
            pending_setup_intent: None,
            latest_invoice: None,
        }];
        *gateway.customer.lock().unwrap() = Some(customer);

        let builder = builder(store, gateway, settings(false, false));
        let snapshot = builder
            .build("u1", SnapshotContext::Account, false)
            .await
            .unwrap();

        let view = &snapshot.subscriptions[0];
        assert_eq!(view.amount.as_deref(), Some("$15.00"));
        assert_eq!(view.current_period_start, "Mar 2, 2020");
    }

    #[tokio::test]
    async fn filters_invoices_and_flags_unpaid() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(Some("cus_1"))));
        let gateway = Arc::new(MockGateway::default());
        *gateway.customer.lock().unwrap() = Some(remote_customer());
        *gateway.invoices.lock().unwrap() = vec![
            RemoteInvoice {
                id: "in_zero".to_string(),
                amount_due: 0,
                ..Default::default()
            },
            RemoteInvoice {
                id: "in_unpaid".to_string(),
                amount_due: 1500,
                attempt_count: 3,
                paid: false,
                lines: vec![RemoteInvoiceLine {
                    period: RemotePeriod {
                        start: 1_583_107_200,
                        end: 1_585_699_200,
                    },
                }],
                ..Default::default()
            },
            RemoteInvoice {
                id: "in_paid".to_string(),
                amount_due: 1500,
                attempt_count: 1,
                paid: true,
                ..Default::default()
            },
        ];

        let builder = builder(store, gateway, settings(false, false));
        let snapshot = builder
            .build("u1", SnapshotContext::Account, true)
            .await
            .unwrap();

        assert_eq!(snapshot.invoices.len(), 2);
        let unpaid = &snapshot.invoices[0];
        assert_eq!(unpaid.id, "in_unpaid");
        assert!(unpaid.unpaid);
        assert_eq!(unpaid.amount, "$15.00");
        assert_eq!(unpaid.period_start, "Mar 2, 2020");
        assert!(!snapshot.invoices[1].unpaid);
    }

    #[tokio::test]
    async fn draft_invoice_failure_is_swallowed() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(Some("cus_1"))));
        let gateway = Arc::new(MockGateway::default());
        *gateway.customer.lock().unwrap() = Some(remote_customer());
        *gateway.upcoming.lock().unwrap() =
            Some(Err(GatewayError::Provider("no upcoming invoice".to_string())));

        let builder = builder(store, gateway.clone(), settings(true, false));
        let snapshot = builder
            .build("u1", SnapshotContext::Account, true)
            .await
            .unwrap();

        assert!(snapshot.invoices.is_empty());
        assert!(gateway.calls().contains(&"upcoming_invoice"));
    }

    #[tokio::test]
    async fn draft_invoice_is_prepended_when_enabled() {
        let store = Arc::new(InMemoryUserStore::with_user(pro_user(Some("cus_1"))));
        let gateway = Arc::new(MockGateway::default());
        *gateway.customer.lock().unwrap() = Some(remote_customer());
        *gateway.invoices.lock().unwrap() = vec![RemoteInvoice {
            id: "in_past".to_string(),
            amount_due: 1500,
            paid: true,
            ..Default::default()
        }];
        *gateway.upcoming.lock().unwrap() = Some(Ok(RemoteInvoice {
            id: "in_draft".to_string(),
            amount_due: 1500,
            ..Default::default()
        }));

        let builder = builder(store, gateway, settings(true, false));
        let snapshot = builder
            .build("u1", SnapshotContext::Account, true)
            .await
            .unwrap();

        let ids: Vec<&str> = snapshot.invoices.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["in_draft", "in_past"]);
    }
}
