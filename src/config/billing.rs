//! Billing behavior configuration and the plan/coupon catalog file.

use serde::Deserialize;

use super::error::{ConfigError, ValidationError};
use crate::domain::billing::PlanCatalog;

/// A coupon this deployment accepts. Unknown codes submitted by users are
/// silently dropped, never forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Coupon {
    /// Code users type in; also the provider-side coupon id.
    pub code: String,

    /// Description shown when the code validates.
    pub description: String,
}

/// Plans and coupons, loaded once at startup from a YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingCatalog {
    pub plans: PlanCatalog,

    #[serde(default)]
    pub coupons: Vec<Coupon>,
}

impl BillingCatalog {
    /// Find a configured coupon by code.
    pub fn find_coupon(&self, code: &str) -> Option<&Coupon> {
        self.coupons.iter().find(|c| c.code == code)
    }
}

/// Billing behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Site name used in notification subjects/bodies.
    pub site_name: String,

    /// Path users land on after card/subscription management actions.
    #[serde(default = "default_account_path")]
    pub account_path: String,

    /// Path to the plan/coupon catalog YAML file.
    pub catalog_path: String,

    /// Prepend the upcoming (draft) invoice to the invoice list.
    #[serde(default)]
    pub show_draft_invoice: bool,

    /// On the choose-plan page, let users stay on (or return to) the free
    /// plan.
    #[serde(default)]
    pub allow_no_upgrade: bool,

    /// Extra paragraph appended to the cancellation notification.
    #[serde(default)]
    pub cancel_mail_extra: Option<String>,
}

impl BillingConfig {
    /// Load and validate the catalog file.
    pub fn load_catalog(&self) -> Result<BillingCatalog, ConfigError> {
        let raw = std::fs::read_to_string(&self.catalog_path)
            .map_err(|e| ConfigError::CatalogUnreadable(format!("{}: {}", self.catalog_path, e)))?;
        let catalog: BillingCatalog = serde_yaml::from_str(&raw)?;

        if catalog.plans.is_empty() {
            return Err(ValidationError::EmptyPlanCatalog.into());
        }
        for plan in catalog.plans.plans() {
            if !plan.is_free() && plan.provider_plan_id.is_empty() {
                return Err(ValidationError::MissingProviderPlanId(plan.id.clone()).into());
            }
        }
        Ok(catalog)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.site_name.is_empty() {
            return Err(ValidationError::MissingRequired("BILLING_SITE_NAME"));
        }
        if self.catalog_path.is_empty() {
            return Err(ValidationError::MissingRequired("BILLING_CATALOG_PATH"));
        }
        Ok(())
    }
}

fn default_account_path() -> String {
    "/account#billing".to_string()
}
