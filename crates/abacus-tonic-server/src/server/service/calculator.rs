//! gRPC implementation of the `Calculator` service.
//!
//! Unary RPCs decode their request into a [`UnaryCall`], evaluate it inline
//! and encode the [`UnaryReply`]. `Factorial` builds a fresh
//! [`FactorialStreamer`] per call and hands it to a spawned producer task
//! that feeds a bounded channel; the receiving half is returned to tonic as
//! the response stream.

use crate::server::{
    service::state::ServiceState,
    streaming::factorial::{StreamOutcome, pump_factorial},
    telemetry::{increment_errors, increment_factorial_steps},
};
use abacus_tonic_core::{
    Error,
    abacus::{FactorialStreamer, Operation, UnaryCall, UnaryReply},
    proto::{
        BinaryReply, BinaryRequest, DivideReply, FactorialStep, PowerRequest, UnaryRequest,
        calculator_server::Calculator,
    },
};
use core::pin::Pin;
use futures::TryStreamExt;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::Instrument;

#[derive(Clone)]
pub struct CalculatorService {
    state: Arc<ServiceState>,
}

impl CalculatorService {
    pub const fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    /// Admits, evaluates and logs one unary call.
    fn evaluate<R>(&self, peer: Option<SocketAddr>, call: UnaryCall) -> Result<Response<R>, Status>
    where
        R: TryFrom<UnaryReply, Error = Error>,
    {
        let operation = call.operation();
        let _guard = self.state.admit(operation)?;
        tracing::info!(?peer, %operation, "{call}");

        let reply = call.evaluate().map_err(Error::from).and_then(|reply| {
            tracing::info!(?peer, %operation, "{reply}");
            R::try_from(reply)
        });

        reply.map(Response::new).map_err(|e| {
            tracing::warn!(?peer, %operation, "ERROR: {e}");
            increment_errors(operation);
            e.into()
        })
    }
}

#[tonic::async_trait]
impl Calculator for CalculatorService {
    type FactorialStream = Pin<Box<dyn Stream<Item = Result<FactorialStep, Status>> + Send>>;

    #[tracing::instrument(name = "add", skip_all)]
    async fn add(&self, req: Request<BinaryRequest>) -> Result<Response<BinaryReply>, Status> {
        let peer = req.remote_addr();
        self.evaluate(peer, req.into_inner().into_add_call())
    }

    #[tracing::instrument(name = "subtract", skip_all)]
    async fn subtract(
        &self,
        req: Request<BinaryRequest>,
    ) -> Result<Response<BinaryReply>, Status> {
        let peer = req.remote_addr();
        self.evaluate(peer, req.into_inner().into_subtract_call())
    }

    #[tracing::instrument(name = "multiply", skip_all)]
    async fn multiply(
        &self,
        req: Request<BinaryRequest>,
    ) -> Result<Response<BinaryReply>, Status> {
        let peer = req.remote_addr();
        self.evaluate(peer, req.into_inner().into_multiply_call())
    }

    #[tracing::instrument(name = "divide", skip_all)]
    async fn divide(&self, req: Request<BinaryRequest>) -> Result<Response<DivideReply>, Status> {
        let peer = req.remote_addr();
        self.evaluate(peer, req.into_inner().into_divide_call())
    }

    #[tracing::instrument(name = "power", skip_all)]
    async fn power(&self, req: Request<PowerRequest>) -> Result<Response<BinaryReply>, Status> {
        let peer = req.remote_addr();
        self.evaluate(peer, req.into_inner().into())
    }

    /// Streams `(k, k!)` for `k = 1..=n`.
    ///
    /// Validation happens before the stream is opened, so a negative `n` is
    /// reported as the call status. Overflow is reported as the last item of
    /// an already open stream.
    #[tracing::instrument(name = "factorial", skip_all, fields(n = req.get_ref().n))]
    async fn factorial(
        &self,
        req: Request<UnaryRequest>,
    ) -> Result<Response<Self::FactorialStream>, Status> {
        let peer = req.remote_addr();
        let n = req.into_inner().n;
        let guard = self.state.admit(Operation::Factorial)?;
        tracing::info!(?peer, "n={n}");

        let streamer = FactorialStreamer::new(n).map_err(|e| {
            tracing::warn!(?peer, "ERROR: {e}");
            increment_errors(Operation::Factorial);
            Status::from(Error::from(e))
        })?;

        let config = self.state.config();
        let (resp_tx, resp_rx) = mpsc::channel(config.stream_buffer_size);
        let producer = pump_factorial(
            streamer,
            resp_tx,
            self.state.shutdown_token().clone(),
            config.factorial_step_delay,
        );

        let fut = async move {
            let outcome = producer.await;
            match &outcome {
                StreamOutcome::Completed { steps } => {
                    tracing::info!(?peer, "Stream completed after {steps} steps");
                }
                StreamOutcome::Abandoned { steps } => {
                    tracing::info!(?peer, "Client left after {steps} steps");
                }
                StreamOutcome::Failed { steps, error } => {
                    tracing::warn!(?peer, "ERROR after {steps} steps: {error}");
                }
                StreamOutcome::Cancelled { steps } => {
                    tracing::warn!(?peer, "Cancelled by shutdown after {steps} steps");
                }
            }
            if outcome.is_error() {
                increment_errors(guard.operation());
            }
            // The call stays in flight until its producer is done.
            drop(guard);
        };
        tokio::spawn(fut.instrument(tracing::info_span!("factorial_stream", n)));

        let stream = ReceiverStream::new(resp_rx).inspect_ok(|step| {
            tracing::debug!("{}! = {}", step.step, step.accumulator);
            increment_factorial_steps();
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
