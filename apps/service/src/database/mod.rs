/// Durable store for monitors and uptime events
///
/// The dispatch engine only depends on the [`Database`] trait; the libsql
/// implementation lives in [`repository`] and owns its schema through
/// versioned [`migrations`].
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{Monitor, UptimeEvent};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

use crate::pool::LibsqlPool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Run migrations on a pooled connection and hand back the store
pub async fn open_database(pool: LibsqlPool) -> Result<DatabaseImpl> {
    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);
    Ok(DatabaseImpl::new_from_pool(pool))
}

/// Fresh migrated database in a temporary directory
#[cfg(test)]
pub(crate) async fn test_database() -> Result<(DatabaseImpl, tempfile::TempDir)> {
    let temp_dir = tempfile::tempdir()?;
    let pool = crate::pool::open_local(temp_dir.path().join("test.db")).await?;
    let database = open_database(pool).await?;
    Ok((database, temp_dir))
}
