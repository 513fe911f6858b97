//! Feature hooks invoked on billing transitions.
//!
//! Hooks are infallible from the caller's perspective; implementations
//! swallow their own errors.

use async_trait::async_trait;

use super::user_store::UserRecord;

/// Hooks the host application can register on billing transitions.
#[async_trait]
pub trait BillingHooks: Send + Sync {
    /// A user's paid subscription was created or upgraded.
    async fn on_upgrade(&self, user: &UserRecord, plan_id: &str);

    /// A user's subscription changed (status rollover, plan change).
    /// Invoked before the record is persisted.
    async fn on_subscription_change(&self, user: &UserRecord);
}

/// Default hooks that do nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopBillingHooks;

#[async_trait]
impl BillingHooks for NoopBillingHooks {
    async fn on_upgrade(&self, _user: &UserRecord, _plan_id: &str) {}

    async fn on_subscription_change(&self, _user: &UserRecord) {}
}
