//! Session store maintenance.

use tower_sessions::ExpiredDeletion;

use super::{CommandError, connect};

/// Delete every session whose expiry has passed.
pub async fn purge_expired() -> Result<(), CommandError> {
    let pool = connect().await?;
    let store = union_bakery_storefront::db::session_store(pool);

    tracing::info!("Deleting expired sessions...");
    store.delete_expired().await?;

    tracing::info!("Expired sessions deleted");
    Ok(())
}
