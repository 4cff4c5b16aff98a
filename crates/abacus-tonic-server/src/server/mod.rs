//! Server-side components of the `abacus` gRPC service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - `Calculator` and `Stats` handlers plus shared call state.
//! - [`streaming`] - per-call stream drivers for `Factorial` and
//!   `DescriptiveStats`.
//! - [`telemetry`] - logging, optional OpenTelemetry export and metrics.
//!
//! These components are wired together in the server's `main.rs`.

pub mod config;
pub mod service;
pub mod streaming;
pub mod telemetry;


use abacus_tonic_core::proto::{calculator_server::CalculatorServer, stats_server::StatsServer};
use service::{calculator::CalculatorService, state::ServiceState, stats::StatsService};
use std::sync::Arc;
use tonic::codec::CompressionEncoding;

/// Builds both gRPC services around one shared [`ServiceState`], with every
/// supported compression encoding enabled in both directions.
pub fn build_services(
    state: &Arc<ServiceState>,
) -> (CalculatorServer<CalculatorService>, StatsServer<StatsService>) {
    let calculator = CalculatorServer::new(CalculatorService::new(Arc::clone(state)))
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate);

    let stats = StatsServer::new(StatsService::new(Arc::clone(state)))
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate);

    (calculator, stats)
}
