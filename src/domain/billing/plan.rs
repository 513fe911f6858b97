//! Plan catalog definitions.
//!
//! The catalog is loaded once at startup and never mutated. Plans carry an
//! integer rank used for upgrade/downgrade comparison.

use serde::{Deserialize, Serialize};

/// Identifier of the sentinel free plan.
pub const FREE_PLAN_ID: &str = "free";

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Stable local identifier (e.g. "pro").
    pub id: String,

    /// Stripe-side price/plan identifier (e.g. "price_xxx").
    pub provider_plan_id: String,

    /// Display name shown to users.
    pub name: String,

    /// Rank used for higher/lower comparison. Bigger means more expensive.
    pub order: i32,
}

impl Plan {
    /// Returns true for the sentinel free plan.
    pub fn is_free(&self) -> bool {
        self.id == FREE_PLAN_ID
    }
}

/// Outcome of comparing two plans by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanComparison {
    Higher,
    Lower,
    Equal,
}

/// Immutable, in-memory list of purchasable plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Look up a plan by its local identifier.
    pub fn find(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Compare plan `a` against plan `b` by rank.
    pub fn compare(a: &Plan, b: &Plan) -> PlanComparison {
        match a.order.cmp(&b.order) {
            std::cmp::Ordering::Greater => PlanComparison::Higher,
            std::cmp::Ordering::Less => PlanComparison::Lower,
            std::cmp::Ordering::Equal => PlanComparison::Equal,
        }
    }

    /// All plans in catalog order.
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
