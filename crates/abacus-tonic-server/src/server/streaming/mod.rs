//! Per-call stream drivers.
//!
//! - [`factorial`] - pushes a `FactorialStreamer` into a bounded response
//!   channel (server streaming).
//! - [`stats`] - folds an inbound value stream into a `StatsAccumulator`
//!   (client streaming).
//!
//! Both own their per-call state for exactly the lifetime of one call and
//! stop at the next suspension point when the service shuts down.

pub mod factorial;
pub mod stats;
