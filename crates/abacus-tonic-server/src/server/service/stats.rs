//! gRPC implementation of the `Stats` service.

use crate::server::{
    service::state::ServiceState, streaming::stats::aggregate, telemetry::increment_errors,
};
use abacus_tonic_core::{
    abacus::Operation,
    proto::{StatsReply, StatsValue, stats_server::Stats},
};
use std::sync::Arc;
use tonic::{Request, Response, Status, Streaming};

#[derive(Clone)]
pub struct StatsService {
    state: Arc<ServiceState>,
}

impl StatsService {
    pub const fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl Stats for StatsService {
    /// Returns the mean and population variance of every value the client
    /// streams. Each call gets its own accumulator, created when the stream
    /// opens and dropped with the reply.
    #[tracing::instrument(name = "descriptive_stats", skip_all)]
    async fn descriptive_stats(
        &self,
        req: Request<Streaming<StatsValue>>,
    ) -> Result<Response<StatsReply>, Status> {
        let peer = req.remote_addr();
        let _guard = self.state.admit(Operation::DescriptiveStats)?;
        tracing::info!(?peer, "Stream opened");

        match aggregate(req.into_inner(), self.state.shutdown_token()).await {
            Ok(summary) => {
                tracing::info!(
                    ?peer,
                    "n={} mean={:.3} var={:.3}",
                    summary.count,
                    summary.mean,
                    summary.variance
                );
                Ok(Response::new(summary.into()))
            }
            Err(status) => {
                tracing::warn!(?peer, "ERROR: {}", status.message());
                increment_errors(Operation::DescriptiveStats);
                Err(status)
            }
        }
    }
}
