//! # Kinship shared library
//!
//! Domain types, persistence and business logic used by the Kinship API
//! server.
//!
//! ## Module Organization
//!
//! - `models`: records and their SQL
//! - `store`: storage traits with Postgres and in-memory backends
//! - `db`: connection pool and embedded migrations
//! - `auth`: passwords, tokens, request identity, family permission checks
//! - `membership`: the join-request workflow
//! - `notifications`: per-recipient inbox and fan-out
//! - `tasks`: shared family tasks
//! - `events`: the family calendar
//! - `addresses`: the family postal address

pub mod addresses;
pub mod auth;
pub mod db;
pub mod events;
pub mod membership;
pub mod models;
pub mod notifications;
pub mod store;
pub mod tasks;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
