//! The Aula processing engine: scan validation, the auto-timeout
//! sweeper, energy aggregation, and live fanout to dashboard viewers.
//!
//! Everything here is generic over [`aula_core::store::TelemetryStore`];
//! the server crate wires it to the SQLite backend.

pub mod aggregator;
pub mod hub;
pub mod snapshot;
pub mod sweeper;
pub mod validator;

#[cfg(test)]
mod tests;

pub use aggregator::Aggregator;
pub use hub::FanoutHub;
pub use snapshot::current_snapshot;
pub use sweeper::Sweeper;
pub use validator::{ScanOutcome, Validator};
