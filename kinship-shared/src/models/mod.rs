//! Domain records and their SQL.
//!
//! Every query function takes any `PgExecutor`, so it runs equally against
//! the pool or inside an open transaction.
//!
//! - `user`: accounts and the single-family pointer
//! - `family`: named groups with one owner
//! - `join_request`: membership petitions and their decision state machine
//! - `notification`: per-recipient inbox with typed payloads
//! - `task`: shared family tasks
//! - `event`: the family calendar
//! - `address`: one postal address per family

pub mod address;
pub mod event;
pub mod family;
pub mod join_request;
pub mod notification;
pub mod task;
pub mod user;
