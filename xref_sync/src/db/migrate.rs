//! set up migrations

use anyhow::anyhow;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::db::connection::strip_sqlite_scheme;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by `run_sqlite` to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database at the given URL.
///
/// This sets the SQLite journal mode to WAL and applies all embedded migrations, returning an error on failure.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(strip_sqlite_scheme(url))?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;

    Ok(())
}

/// Runs pending migrations for the given database URL.
///
/// Only SQLite is supported as a target store; `postgres://` URLs are rejected up front
/// instead of failing later with a confusing file-open error.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        anyhow::bail!("Unsupported DATABASE_URL (only SQLite targets are supported): {database_url}");
    }
    run_sqlite(database_url)
}
