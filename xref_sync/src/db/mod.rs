//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a 5000ms busy_timeout;
//!   [`connection::connect_sqlite_with_busy_timeout`] lets a load run align the busy timeout with its commit timeout.
//! - Embedded Diesel migrations and runners: [`migrate::run_sqlite`] and [`migrate::run_all`],
//!   which accepts `sqlite:` URLs as well as bare file paths.
//!
//! Example:
//! ```no_run
//! use xref_sync::db::{migrate, connection};
//!
//! let db_path = std::env::temp_dir().join("xref_sync_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//!
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
