//! Postgres connection handling.
//!
//! - `pool`: pooled connections with health checks
//! - `migrations`: embedded schema migrations

pub mod migrations;
pub mod pool;
