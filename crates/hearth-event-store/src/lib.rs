//! PostgreSQL persistence for session event streams.

pub mod pg_event_repository;

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

/// Applies the bundled schema migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the recorded history
/// does not match the bundled files.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
