//! User store port.
//!
//! The user record is owned by an opaque document store with find/save
//! semantics. `save` must preserve fields this service does not model;
//! adapters are responsible for partial-update behavior.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::billing::{BillingState, BillingError, FREE_PLAN_ID};

/// A user as this service sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable local user id.
    pub id: String,

    /// Email address used for provider customers and notifications.
    pub email: String,

    /// Current entitlement; a catalog plan id or the free sentinel.
    pub plan: String,

    /// Embedded billing state.
    #[serde(default)]
    pub billing: BillingState,
}

impl UserRecord {
    /// A fresh user on the free baseline.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            plan: FREE_PLAN_ID.to_string(),
            billing: BillingState::default(),
        }
    }
}

/// Errors from the user store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist where an invariant says it must.
    #[error("user not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        BillingError::Store(err.to_string())
    }
}

/// Port for the user persistence store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by local id.
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Find the user owning the given provider customer id.
    async fn find_by_customer_id(&self, customer_id: &str)
        -> Result<Option<UserRecord>, StoreError>;

    /// Persist the record, preserving fields outside this model.
    async fn save(&self, user: &UserRecord) -> Result<(), StoreError>;
}
