//! Database module: row mapping and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: conversions from SQLite rows into domain entities.
//! - `repo`: SQL-only functions used by the store adapters.
//!
//! External modules should import from `txn_ledger::db`; the repository API is
//! re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;
