use abacus_tonic_core::{Error, abacus::FactorialStreamer, proto::FactorialStep};
use core::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// How a factorial producer ended. `steps` is the number of steps the
/// streamer computed, which bounds the work done for the call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// Every requested step was handed to the response stream.
    Completed { steps: i32 },
    /// The streamer failed; the error was forwarded as the final item.
    Failed { steps: i32, error: Error },
    /// The client stopped reading. Not an error.
    Abandoned { steps: i32 },
    /// The service shut down before the stream completed.
    Cancelled { steps: i32 },
}

impl StreamOutcome {
    pub const fn steps(&self) -> i32 {
        match self {
            Self::Completed { steps }
            | Self::Failed { steps, .. }
            | Self::Abandoned { steps }
            | Self::Cancelled { steps } => *steps,
        }
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Cancelled { .. })
    }
}

/// Drives a [`FactorialStreamer`] into the response channel of one call.
///
/// Exactly one step is computed per successful send, and `resp_tx` is
/// bounded, so the producer runs at most the channel capacity ahead of the
/// client. The loop ends when:
///
/// - the streamer is exhausted ([`StreamOutcome::Completed`]),
/// - the streamer reports overflow, which is forwarded to the client as the
///   last item of the stream ([`StreamOutcome::Failed`]),
/// - the receiving half is dropped because the client went away
///   ([`StreamOutcome::Abandoned`]); no further step is computed,
/// - `shutdown` is cancelled ([`StreamOutcome::Cancelled`]); the client gets
///   `UNAVAILABLE` if there is room in the channel.
///
/// `step_delay` paces emission. The pause is interrupted by both
/// cancellation and client disconnect.
pub async fn pump_factorial(
    mut streamer: FactorialStreamer,
    resp_tx: mpsc::Sender<Result<FactorialStep, Status>>,
    shutdown: CancellationToken,
    step_delay: Duration,
) -> StreamOutcome {
    loop {
        if resp_tx.is_closed() {
            return StreamOutcome::Abandoned {
                steps: streamer.steps_computed(),
            };
        }
        if shutdown.is_cancelled() {
            return cancelled(&resp_tx, &streamer);
        }

        let step = match streamer.next() {
            None => {
                return StreamOutcome::Completed {
                    steps: streamer.steps_computed(),
                };
            }
            Some(Ok(step)) => step,
            Some(Err(e)) => {
                let error = Error::from(e);
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return cancelled(&resp_tx, &streamer),
                    sent = resp_tx.send(Err(error.clone().into())) => {
                        // The client may have disconnected meanwhile.
                        if let Err(_e) = sent {
                            tracing::debug!("Failed to forward factorial error: {_e}");
                        }
                    }
                }
                return StreamOutcome::Failed {
                    steps: streamer.steps_computed(),
                    error,
                };
            }
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return cancelled(&resp_tx, &streamer),
            sent = resp_tx.send(Ok(step.into())) => {
                if sent.is_err() {
                    return StreamOutcome::Abandoned {
                        steps: streamer.steps_computed(),
                    };
                }
            }
        }

        tracing::trace!(step = step.step, accumulator = step.accumulator, "Sent step");

        if !step_delay.is_zero() && !streamer.is_finished() {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return cancelled(&resp_tx, &streamer),
                () = resp_tx.closed() => {
                    return StreamOutcome::Abandoned {
                        steps: streamer.steps_computed(),
                    };
                }
                () = tokio::time::sleep(step_delay) => {}
            }
        }
    }
}

fn cancelled(
    resp_tx: &mpsc::Sender<Result<FactorialStep, Status>>,
    streamer: &FactorialStreamer,
) -> StreamOutcome {
    // Never block shutdown on a slow client.
    if let Err(_e) = resp_tx.try_send(Err(Error::ServiceShutdown.into())) {
        tracing::debug!("Could not notify client of shutdown: {_e}");
    }
    StreamOutcome::Cancelled {
        steps: streamer.steps_computed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_tonic_core::abacus::Operation;
    use tonic::Code;

    fn spawn_pump(
        n: i32,
        capacity: usize,
        shutdown: CancellationToken,
        step_delay: Duration,
    ) -> (
        mpsc::Receiver<Result<FactorialStep, Status>>,
        tokio::task::JoinHandle<StreamOutcome>,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        let streamer = FactorialStreamer::new(n).unwrap();
        let handle = tokio::spawn(pump_factorial(streamer, tx, shutdown, step_delay));
        (rx, handle)
    }

    async fn drain(
        rx: &mut mpsc::Receiver<Result<FactorialStep, Status>>,
    ) -> Vec<Result<FactorialStep, Status>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn streams_all_steps_in_order() {
        let (mut rx, handle) = spawn_pump(5, 1, CancellationToken::new(), Duration::ZERO);

        let steps: Vec<_> = drain(&mut rx)
            .await
            .into_iter()
            .map(|item| {
                let s = item.unwrap();
                (s.step, s.accumulator)
            })
            .collect();

        assert_eq!(steps, [(1, 1), (2, 2), (3, 6), (4, 24), (5, 120)]);
        assert_eq!(handle.await.unwrap(), StreamOutcome::Completed { steps: 5 });
    }

    #[tokio::test]
    async fn zero_closes_without_items() {
        let (mut rx, handle) = spawn_pump(0, 1, CancellationToken::new(), Duration::ZERO);
        assert!(drain(&mut rx).await.is_empty());
        assert_eq!(handle.await.unwrap(), StreamOutcome::Completed { steps: 0 });
    }

    #[tokio::test]
    async fn overflow_ends_stream_after_valid_steps() {
        let (mut rx, handle) = spawn_pump(25, 4, CancellationToken::new(), Duration::ZERO);
        let items = drain(&mut rx).await;

        assert_eq!(items.len(), 21);
        assert!(items[..20].iter().all(Result::is_ok));
        assert_eq!(
            items[19].as_ref().unwrap().accumulator,
            2_432_902_008_176_640_000
        );
        let status = items[20].as_ref().unwrap_err();
        assert_eq!(status.code(), Code::OutOfRange);

        let outcome = handle.await.unwrap();
        assert!(outcome.is_error());
        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                steps: 20,
                error: Error::Compute(abacus_tonic_core::abacus::Error::Overflow {
                    operation: Operation::Factorial
                }),
            }
        );
    }

    #[tokio::test]
    async fn shutdown_releases_producer_blocked_on_overflow_error() {
        let shutdown = CancellationToken::new();
        let (mut rx, handle) = spawn_pump(25, 1, shutdown.clone(), Duration::ZERO);

        // Read part of the stream, then stall with the connection still open.
        for expected in 1..=19 {
            assert_eq!(rx.recv().await.unwrap().unwrap().step, expected);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("producer stayed blocked after cancellation")
            .unwrap();
        assert!(matches!(outcome, StreamOutcome::Cancelled { .. }), "{outcome:?}");
        drop(rx);
    }

    #[tokio::test]
    async fn abandoning_stops_computation() {
        let (mut rx, handle) = spawn_pump(10, 1, CancellationToken::new(), Duration::ZERO);

        assert_eq!(rx.recv().await.unwrap().unwrap().step, 1);
        assert_eq!(rx.recv().await.unwrap().unwrap().step, 2);
        drop(rx);

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, StreamOutcome::Abandoned { .. }));
        assert!(!outcome.is_error());
        // Two delivered, at most one buffered and one blocked in `send`.
        assert!(outcome.steps() <= 4, "computed {} steps", outcome.steps());
    }

    #[tokio::test]
    async fn abandoning_interrupts_step_delay() {
        let (mut rx, handle) = spawn_pump(3, 1, CancellationToken::new(), Duration::from_secs(3600));

        assert_eq!(rx.recv().await.unwrap().unwrap().step, 1);
        drop(rx);

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("producer kept sleeping after the client left")
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Abandoned { steps: 1 });
    }

    #[tokio::test]
    async fn shutdown_cancels_and_notifies_client() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (mut rx, handle) = spawn_pump(10, 1, shutdown, Duration::ZERO);

        let items = drain(&mut rx).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().code(), Code::Unavailable);
        assert_eq!(handle.await.unwrap(), StreamOutcome::Cancelled { steps: 0 });
    }

    #[tokio::test]
    async fn shutdown_interrupts_step_delay() {
        let shutdown = CancellationToken::new();
        let (mut rx, handle) = spawn_pump(3, 4, shutdown.clone(), Duration::from_secs(3600));

        assert_eq!(rx.recv().await.unwrap().unwrap().step, 1);
        shutdown.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("producer ignored cancellation")
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled { steps: 1 });
        assert_eq!(
            rx.recv().await.unwrap().unwrap_err().code(),
            Code::Unavailable
        );
    }
}
