//! Prayer engine library
//!
//! Access control, display ordering and subject linking for a social
//! prayer-sharing backend. Exposed as a library for the binary, for
//! integration tests and for embedding behind an HTTP transport.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
