//! Transactions ledger: ingests a CSV file of account transactions, stores
//! them, summarizes every touched account and notifies its owner.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod model;
pub mod notify;
pub mod parser;
pub mod pipeline;
pub mod sendgrid;
pub mod source;
pub mod store;
