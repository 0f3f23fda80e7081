//! Database migration commands.
//!
//! The storefront keeps nothing in `PostgreSQL` except sessions, so the only
//! migration is the `tower_sessions.session` table.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (or `DATABASE_URL`)

use super::{CommandError, connect};

/// Create the storefront session table.
pub async fn storefront() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Creating session table...");
    union_bakery_storefront::db::migrate_sessions(pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
