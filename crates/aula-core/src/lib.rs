//! Core types and trait definitions for the Aula telemetry engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod directory;
pub mod energy;
pub mod error;
pub mod event;
pub mod schedule;
pub mod session;
pub mod store;

pub use error::{Error, Result};
