use crate::server::telemetry::increment_stats_values;
use abacus_tonic_core::{
    Error,
    abacus::{StatsAccumulator, Summary},
    proto::StatsValue,
};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Folds an inbound stream of values into a fresh [`StatsAccumulator`].
///
/// Values are consumed strictly in arrival order and never buffered. The
/// summary is computed once the client closes its half of the stream.
///
/// # Errors
///
/// - the transport [`Status`] of a failed inbound message, unchanged,
/// - `INVALID_ARGUMENT` for a non-finite value or an empty stream,
/// - `OUT_OF_RANGE` if the summary exceeds the `f64` range,
/// - `UNAVAILABLE` if `shutdown` is cancelled before the stream ends.
pub async fn aggregate<S>(mut values: S, shutdown: &CancellationToken) -> Result<Summary, Status>
where
    S: Stream<Item = Result<StatsValue, Status>> + Unpin,
{
    let mut accumulator = StatsAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(Error::ServiceShutdown.into()),
            next = values.next() => next,
        };

        match next {
            Some(Ok(StatsValue { v })) => {
                tracing::debug!(value = v, count = accumulator.count() + 1, "Received value");
                accumulator.push(v).map_err(Error::from)?;
                increment_stats_values();
            }
            Some(Err(status)) => return Err(status),
            None => break,
        }
    }

    accumulator
        .finish()
        .map_err(|e| Error::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tonic::Code;

    fn values(vs: &[f64]) -> impl Stream<Item = Result<StatsValue, Status>> + Unpin {
        stream::iter(
            vs.iter()
                .map(|&v| Ok(StatsValue { v }))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn summarizes_stream() {
        let summary = aggregate(
            values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-9);
        assert!((summary.variance - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn single_value_has_zero_variance() {
        let summary = aggregate(values(&[-12.5]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.mean, -12.5);
        assert_eq!(summary.variance, 0.0);
    }

    #[tokio::test]
    async fn empty_stream_is_invalid() {
        let status = aggregate(values(&[]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn non_finite_value_is_invalid() {
        let status = aggregate(values(&[1.0, f64::NAN, 3.0]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn transport_error_is_propagated() {
        let inbound = stream::iter(vec![
            Ok(StatsValue { v: 1.0 }),
            Err(Status::data_loss("truncated frame")),
            Ok(StatsValue { v: 2.0 }),
        ]);
        let status = aggregate(inbound, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::DataLoss);
        assert_eq!(status.message(), "truncated frame");
    }

    #[tokio::test]
    async fn shutdown_interrupts_open_stream() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let status = aggregate(stream::pending(), &shutdown).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
