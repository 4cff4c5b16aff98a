//! gRPC service implementations and call routing.
//!
//! Tonic routes each RPC to a handler method; the handlers are the call
//! dispatcher. They own no per-call state themselves: every call either
//! evaluates a stateless [`UnaryCall`](abacus_tonic_core::abacus::UnaryCall)
//! or constructs its own streamer/accumulator.
//!
//! ## Structure
//!
//! - [`calculator`] - `Calculator` service (`CalculatorService`).
//! - [`stats`] - `Stats` service (`StatsService`).
//! - [`state`] - call admission, in-flight tracking and graceful shutdown.

pub mod calculator;
pub mod state;
pub mod stats;
