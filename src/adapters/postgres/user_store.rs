//! PostgreSQL implementation of UserStore.
//!
//! The user record lives in a `billing_users` table with the billing state
//! embedded as JSONB. Saves merge into the stored billing document rather
//! than replacing it, so keys written by other services survive.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::BillingState;
use crate::ports::{StoreError, UserRecord, UserStore};

/// PostgreSQL implementation of the UserStore port.
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a user.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    plan: String,
    billing: serde_json::Value,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let billing: BillingState = serde_json::from_value(row.billing)
            .map_err(|e| StoreError::Backend(format!("invalid billing state: {}", e)))?;

        Ok(UserRecord {
            id: row.id,
            email: row.email,
            plan: row.plan,
            billing,
        })
    }
}

fn backend_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, plan, billing
            FROM billing_users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, plan, billing
            FROM billing_users
            WHERE billing->>'customer_id' = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
        let billing = serde_json::to_value(&user.billing)
            .map_err(|e| StoreError::Backend(format!("unserializable billing state: {}", e)))?;

        // The JSONB merge keeps keys other services wrote into the billing
        // document; modeled keys are overwritten, including with nulls.
        sqlx::query(
            r#"
            INSERT INTO billing_users (id, email, plan, billing, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                plan = EXCLUDED.plan,
                billing = billing_users.billing || EXCLUDED.billing,
                updated_at = now()
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.plan)
        .bind(billing)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }
}
