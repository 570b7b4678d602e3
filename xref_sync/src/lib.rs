//! Cross-reference reconciliation and idempotent association loading.
//!
//! Association rows arrive with endpoint identifiers in mixed schemes (`ORPHA:558`,
//! `OMIM:154700`, `MONDO:0007947`, bare `558`). The crate classifies them
//! ([`identifier`]), maps them to canonical codes ([`resolver`]), loads fully resolved
//! rows into a target store in idempotent batches ([`loader`], [`store`]) and accounts
//! for every row in a [`report::ReconciliationReport`].

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod identifier;
pub mod loader;
pub mod models;
pub mod report;
pub mod resolver;
#[allow(missing_docs)]
pub mod schema;
pub mod source;
pub mod store;
