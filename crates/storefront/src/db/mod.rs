//! Session database.
//!
//! `PostgreSQL` holds one table, the `tower_sessions.session` table owned by
//! [`PostgresStore`]. Cart, auth and checkout records live inside session
//! rows; nothing else is stored locally.
//!
//! The table is created by the CLI, never on startup:
//!
//! ```bash
//! cargo run -p union-bakery-cli -- migrate storefront
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower_sessions_sqlx_store::PostgresStore;

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// The session store over `pool`.
#[must_use]
pub fn session_store(pool: PgPool) -> PostgresStore {
    PostgresStore::new(pool)
}

/// Create the session table if it does not exist.
///
/// # Errors
///
/// Returns `sqlx::Error` if the migration fails.
pub async fn migrate_sessions(pool: PgPool) -> Result<(), sqlx::Error> {
    session_store(pool).migrate().await
}
