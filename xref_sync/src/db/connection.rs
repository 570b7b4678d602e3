//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies recommended PRAGMAs:
//! WAL journaling, foreign_keys=ON (the association table relies on composite FKs into
//! `entity`), and a busy_timeout.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Busy timeout applied by [`connect_sqlite`].
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    connect_sqlite_with_busy_timeout(database_url, DEFAULT_BUSY_TIMEOUT_MS)
}

/// Same as [`connect_sqlite`] with an explicit `busy_timeout` in milliseconds.
pub fn connect_sqlite_with_busy_timeout(
    database_url: &str,
    busy_timeout_ms: u64,
) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(strip_sqlite_scheme(database_url))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query(format!("PRAGMA busy_timeout={busy_timeout_ms};")).execute(&mut conn)?;
    Ok(conn)
}

/// `sqlite://path`, `sqlite:path` and `path` all name the same file.
pub(crate) fn strip_sqlite_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::strip_sqlite_scheme;

    #[test]
    fn scheme_is_optional() {
        assert_eq!(strip_sqlite_scheme("sqlite:///tmp/x.db"), "/tmp/x.db");
        assert_eq!(strip_sqlite_scheme("sqlite:x.db"), "x.db");
        assert_eq!(strip_sqlite_scheme("x.db"), "x.db");
        assert_eq!(strip_sqlite_scheme(":memory:"), ":memory:");
    }
}
