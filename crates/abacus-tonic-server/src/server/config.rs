use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `abacus-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "abacus-tonic-server",
    version,
    about = "A gRPC service for checked arithmetic, streamed factorials and online statistics"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/abacus.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the channel between a factorial producer and its gRPC
    /// stream.
    ///
    /// The producer computes at most this many steps ahead of the client.
    /// Keep it small: factorial steps are tiny and a deep buffer only delays
    /// noticing that the client went away.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 1)]
    pub stream_buffer_size: usize,

    /// Pause between two emitted factorial steps, in milliseconds.
    ///
    /// Zero disables pacing. Useful for demos where the stream should be
    /// visibly incremental.
    ///
    /// Environment variable: `FACTORIAL_STEP_DELAY_MS`
    #[arg(long, env = "FACTORIAL_STEP_DELAY_MS", default_value_t = 0)]
    pub factorial_step_delay_ms: u64,

    /// Seconds to wait for in-flight calls to finish on shutdown before the
    /// remaining streams are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub factorial_step_delay: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            stream_buffer_size: 1,
            factorial_step_delay: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        // `tokio::sync::mpsc::channel` panics on a zero capacity.
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.server_addr.is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            factorial_step_delay: Duration::from_millis(args.factorial_step_delay_ms),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("abacus-tonic-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_applied() {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:6000",
            "--stream-buffer-size",
            "4",
            "--factorial-step-delay-ms",
            "50",
            "--shutdown-timeout",
            "10",
        ])
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:6000");
        assert!(!config.uds);
        assert_eq!(config.stream_buffer_size, 4);
        assert_eq!(config.factorial_step_delay, Duration::from_millis(50));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = parse(&["--stream-buffer-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(parse(&["--server-addr", ""]).is_err());
    }
}
