#![doc = include_str!("../README.md")]

mod server;

use abacus_tonic_core::proto::{
    FILE_DESCRIPTOR_SET, calculator_server::CalculatorServer, stats_server::StatsServer,
};
use clap::Parser;
use futures::Stream;
use server::build_services;
use server::config::{CliArgs, ServerConfig};
use server::service::{calculator::CalculatorService, state::ServiceState, stats::StatsService};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::{net::TcpListener, signal};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, server::Connected};
use tonic_health::server::HealthReporter;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let config = ServerConfig::try_from(CliArgs::parse())?;
    let providers = init_telemetry()?;

    let state = Arc::new(ServiceState::new(config));
    let addr = state.config().server_addr.clone();

    let served = if state.config().uds {
        serve_uds(&addr, Arc::clone(&state)).await
    } else {
        let incoming = TcpListenerStream::new(TcpListener::bind(&addr).await?);
        announce(&addr, state.config());
        serve(incoming, state).await
    };

    // Flush whatever telemetry the drain produced, even if serving failed.
    providers.shutdown();
    served
}

#[cfg(unix)]
async fn serve_uds(path: &str, state: Arc<ServiceState>) -> anyhow::Result<()> {
    use std::path::Path;
    use tokio::net::UnixListener;
    use tokio_stream::wrappers::UnixListenerStream;

    // A crashed previous run leaves its socket file behind; bind would fail.
    if Path::new(path).exists() {
        tracing::warn!("Removing stale socket {path}");
        std::fs::remove_file(path)?;
    }

    let incoming = UnixListenerStream::new(UnixListener::bind(path)?);
    announce(path, state.config());
    let served = serve(incoming, state).await;
    let _ = std::fs::remove_file(path);
    served
}

#[cfg(not(unix))]
async fn serve_uds(_path: &str, _state: Arc<ServiceState>) -> anyhow::Result<()> {
    anyhow::bail!("Unix domain sockets are not supported on this platform")
}

/// Serves `Calculator`, `Stats`, health and reflection on `incoming` until a
/// termination signal has been handled.
async fn serve<I, IO, IE>(incoming: I, state: Arc<ServiceState>) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    publish_health(&health_reporter, true).await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let (calculator, stats) = build_services(&state);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(ServiceBuilder::new().layer(cors).layer(GrpcWebLayer::new()))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(calculator)
        .add_service(stats)
        .serve_with_incoming_shutdown(incoming, async move {
            let signal = wait_for_signal().await;
            tracing::info!("Received {signal}, shutting down gracefully");
            publish_health(&health_reporter, false).await;
            state.shutdown().await;
        })
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn announce(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting abacus service on {addr} with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting abacus service on {addr} (stream buffer {}, drain {:?})",
            config.stream_buffer_size,
            config.shutdown_timeout
        );
    }
}

async fn publish_health(reporter: &HealthReporter, serving: bool) {
    if serving {
        reporter
            .set_serving::<CalculatorServer<CalculatorService>>()
            .await;
        reporter.set_serving::<StatsServer<StatsService>>().await;
    } else {
        reporter
            .set_not_serving::<CalculatorServer<CalculatorService>>()
            .await;
        reporter.set_not_serving::<StatsServer<StatsService>>().await;
    }
}

/// Resolves with the name of the first termination signal received.
///
/// A handler that cannot be installed is logged and never fires, so the other
/// one still works.
async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "Ctrl+C",
        () = terminate => "SIGTERM",
    }
}
