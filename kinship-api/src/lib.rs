//! # Kinship API Server Library
//!
//! HTTP surface of the family organizer: join requests, notifications,
//! families, accounts and the shared task board.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration from the environment
//! - `error`: error handling and HTTP response mapping
//! - `middleware`: security headers
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
