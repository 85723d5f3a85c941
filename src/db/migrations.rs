//! SQLite pool setup and schema application.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open the database, creating it if needed, and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // the scheduler is the only writer; the price refresh task never
    // touches the database
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    info!(path = db_path, "database ready");
    Ok(pool)
}

/// Apply `schema.sql` statement by statement. Everything in it is
/// `CREATE ... IF NOT EXISTS`, so reapplying on startup is a no-op.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in include_str!("schema.sql").split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement).execute(pool).await?;
        }
    }
    Ok(())
}
