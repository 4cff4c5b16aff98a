//! Command-line client for the `abacus` gRPC service.
//!
//! Each subcommand issues one call and prints the reply with its round-trip
//! latency; `bench` issues a series of `Add` calls and summarises latency.

use abacus_tonic_core::{
    abacus::StatsAccumulator,
    proto::{
        BinaryRequest, PowerRequest, StatsValue, UnaryRequest, calculator_client::CalculatorClient,
        stats_client::StatsClient,
    },
};
use clap::{Parser, Subcommand};
use core::time::Duration;
use std::time::Instant;
use tonic::{Code, IntoRequest, Request, Status, codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(name = "abacus-client", version, about = "Client for the abacus gRPC service")]
struct Cli {
    /// Server URI.
    ///
    /// Environment variable: `ABACUS_SERVER`
    #[arg(
        long,
        env = "ABACUS_SERVER",
        default_value_t = String::from("http://127.0.0.1:50051")
    )]
    server_addr: String,

    /// Per-call deadline, in seconds.
    #[arg(long, default_value_t = 2)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// x + y
    Add(Operands),
    /// x - y
    Subtract(Operands),
    /// x * y
    Multiply(Operands),
    /// Truncating x / y with remainder
    Divide(Operands),
    /// base^exponent
    Power {
        #[arg(allow_negative_numbers = true)]
        base: i32,
        #[arg(allow_negative_numbers = true)]
        exponent: i32,
    },
    /// Streams k! for k = 1..=n
    Factorial {
        #[arg(allow_negative_numbers = true)]
        n: i32,
    },
    /// Mean and population variance of the given values
    Stats {
        #[arg(allow_negative_numbers = true, required = true)]
        values: Vec<f64>,
    },
    /// Times a series of `Add` calls and prints a latency summary
    Bench {
        #[arg(long, default_value_t = 100)]
        requests: u32,
    },
}

fn with_deadline<T>(message: T, timeout: Duration) -> Request<T> {
    let mut request = message.into_request();
    request.set_timeout(timeout);
    request
}

#[derive(clap::Args, Debug, Clone, Copy, PartialEq, Eq)]
struct Operands {
    #[arg(allow_negative_numbers = true)]
    x: i32,
    #[arg(allow_negative_numbers = true)]
    y: i32,
}

impl From<Operands> for BinaryRequest {
    fn from(Operands { x, y }: Operands) -> Self {
        Self { x, y }
    }
}

struct Session {
    calculator: CalculatorClient<Channel>,
    stats: StatsClient<Channel>,
    server_addr: String,
    timeout: Duration,
}

impl Session {
    /// Prints a failed call the way an operator wants to read it.
    fn report(&self, status: &Status) {
        match status.code() {
            Code::Unavailable => println!(
                "[ERROR] Cannot reach server at {}. Is it running? ({})",
                self.server_addr,
                status.message()
            ),
            Code::DeadlineExceeded => println!(
                "[ERROR] Call exceeded {}s timeout.",
                self.timeout.as_secs()
            ),
            code => println!("[ERROR] RPC failed: {code:?} - {}", status.message()),
        }
    }

    async fn run(&mut self, command: Command) -> Result<(), Status> {
        let timeout = self.timeout;
        let t0 = Instant::now();
        match command {
            Command::Add(operands) => {
                let reply = self
                    .calculator
                    .add(with_deadline(BinaryRequest::from(operands), timeout))
                    .await?;
                println!("  Result: {}", reply.into_inner().result);
            }
            Command::Subtract(operands) => {
                let reply = self
                    .calculator
                    .subtract(with_deadline(BinaryRequest::from(operands), timeout))
                    .await?;
                println!("  Result: {}", reply.into_inner().result);
            }
            Command::Multiply(operands) => {
                let reply = self
                    .calculator
                    .multiply(with_deadline(BinaryRequest::from(operands), timeout))
                    .await?;
                println!("  Result: {}", reply.into_inner().result);
            }
            Command::Divide(operands) => {
                let reply = self
                    .calculator
                    .divide(with_deadline(BinaryRequest::from(operands), timeout))
                    .await?
                    .into_inner();
                println!("  Quotient : {}", reply.quotient);
                println!("  Remainder: {}", reply.remainder);
            }
            Command::Power { base, exponent } => {
                let reply = self
                    .calculator
                    .power(with_deadline(PowerRequest { base, exponent }, timeout))
                    .await?;
                println!("  Result: {}", reply.into_inner().result);
            }
            Command::Factorial { n } => {
                let mut stream = self
                    .calculator
                    .factorial(with_deadline(UnaryRequest { n }, timeout))
                    .await?
                    .into_inner();
                println!("  Streaming results:");
                while let Some(step) = stream.message().await? {
                    println!("    {}! = {}", step.step, step.accumulator);
                }
            }
            Command::Stats { values } => {
                let values: Vec<StatsValue> = values.into_iter().map(|v| StatsValue { v }).collect();
                let reply = self
                    .stats
                    .descriptive_stats(with_deadline(tokio_stream::iter(values), timeout))
                    .await?
                    .into_inner();
                println!("  Mean    : {}", reply.mean);
                println!("  Variance: {}", reply.variance);
            }
            Command::Bench { requests } => {
                self.bench(requests).await;
                return Ok(());
            }
        }
        println!(
            "  (round-trip ~ {:.2} ms)",
            t0.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    async fn bench(&mut self, requests: u32) {
        let mut latencies_ms = Vec::with_capacity(requests as usize);
        let mut failures = 0_u32;

        for i in 1..=requests {
            // Clamp so large request counts cannot overflow the sum.
            let x = i32::try_from(i).unwrap_or(i32::MAX / 2).min(i32::MAX / 2);
            let request = with_deadline(BinaryRequest { x, y: x }, self.timeout);
            let t0 = Instant::now();
            match self.calculator.add(request).await {
                Ok(_) => latencies_ms.push(t0.elapsed().as_secs_f64() * 1000.0),
                Err(status) => {
                    failures += 1;
                    println!("[{i:03}]  RPC failed: {:?} - {}", status.code(), status.message());
                }
            }
        }

        println!("\n=== RPC BENCHMARK SUMMARY ===");
        println!("Target server      : {}", self.server_addr);
        println!("Total requests     : {requests}");
        println!("Successful replies : {}", latencies_ms.len());
        println!("Failures           : {failures}");

        if let Some(summary) = LatencySummary::from_samples(latencies_ms) {
            println!("\nLatency (ms) for successful calls:");
            println!("  mean   : {:7.2}", summary.mean);
            println!("  median : {:7.2}", summary.median);
            println!("  min    : {:7.2}", summary.min);
            println!("  max    : {:7.2}", summary.max);
            if let Some(p95) = summary.p95 {
                println!("  95th % : {p95:7.2}");
            }
        }
    }
}

#[derive(Debug, PartialEq)]
struct LatencySummary {
    mean: f64,
    median: f64,
    min: f64,
    max: f64,
    /// Only reported once there are enough samples for it to mean anything.
    p95: Option<f64>,
}

impl LatencySummary {
    const MIN_SAMPLES_FOR_P95: usize = 20;

    fn from_samples(mut samples: Vec<f64>) -> Option<Self> {
        let mut acc = StatsAccumulator::new();
        acc.try_extend(samples.iter().copied()).ok()?;
        let mean = acc.mean()?;

        samples.sort_by(f64::total_cmp);
        let n = samples.len();
        let median = if n % 2 == 1 {
            samples[n / 2]
        } else {
            (samples[n / 2 - 1] + samples[n / 2]) / 2.0
        };
        let p95 = (n >= Self::MIN_SAMPLES_FOR_P95).then(|| percentile(&samples, 95));

        Some(Self {
            mean,
            median,
            min: samples[0],
            max: samples[n - 1],
            p95,
        })
    }
}

/// `pct`-th percentile of sorted data using the exclusive method: the
/// sample is treated as drawn from a wider population, so the estimate
/// interpolates between ranks `(n + 1) * pct / 100`.
fn percentile(sorted: &[f64], pct: usize) -> f64 {
    debug_assert!(sorted.len() >= 2);
    let m = sorted.len() + 1;
    let j = (pct * m / 100).clamp(1, sorted.len() - 1);
    let delta = (pct * m) as f64 - (j * 100) as f64;
    (sorted[j - 1] * (100.0 - delta) + sorted[j] * delta) / 100.0
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let channel = match Channel::from_shared(cli.server_addr.clone())?.connect().await {
        Ok(channel) => channel,
        Err(e) => {
            println!(
                "[ERROR] Cannot reach server at {}. Is it running? ({e})",
                cli.server_addr
            );
            std::process::exit(1);
        }
    };

    let mut session = Session {
        calculator: CalculatorClient::new(channel.clone())
            .accept_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Zstd),
        stats: StatsClient::new(channel)
            .accept_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Zstd),
        server_addr: cli.server_addr,
        timeout: Duration::from_secs(cli.timeout_secs),
    };

    if let Err(status) = session.run(cli.command).await {
        session.report(&status);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let data: Vec<f64> = (1..=100).map(f64::from).collect();
        assert!((percentile(&data, 95) - 95.95).abs() < 1e-9);

        let data: Vec<f64> = (1..=20).map(f64::from).collect();
        assert!((percentile(&data, 95) - 19.95).abs() < 1e-9);
    }

    #[test]
    fn summary_of_a_few_samples() {
        let summary = LatencySummary::from_samples(vec![3.0, 1.0, 2.0, 10.0]).unwrap();
        assert_eq!(summary.mean, 4.0);
        assert_eq!(summary.median, 2.5);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 10.0);
        assert_eq!(summary.p95, None);
    }

    #[test]
    fn p95_needs_twenty_samples() {
        let samples: Vec<f64> = (1..=20).map(f64::from).collect();
        let summary = LatencySummary::from_samples(samples).unwrap();
        assert_eq!(summary.median, 10.5);
        assert!(summary.p95.is_some());
    }

    #[test]
    fn no_samples_no_summary() {
        assert_eq!(LatencySummary::from_samples(Vec::new()), None);
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["abacus-client", "divide", "7", "-2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Divide(Operands { x: 7, y: -2 })
        ));

        let cli = Cli::try_parse_from(["abacus-client", "factorial", "-1"]).unwrap();
        assert!(matches!(cli.command, Command::Factorial { n: -1 }));

        let cli = Cli::try_parse_from(["abacus-client", "stats", "1.5", "-2", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Stats { ref values } if values == &[1.5, -2.0, 3.0]));
        assert_eq!(cli.timeout_secs, 2);
    }
}
