//! PostgreSQL adapter - persistent user store.

mod user_store;

pub use user_store::PostgresUserStore;
