use crate::{Error, Operation, Result};
use core::iter::FusedIterator;

/// One element of a factorial stream: `accumulator == step!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorialStep {
    pub step: i32,
    pub accumulator: i64,
}

/// A lazy generator over `1!, 2!, ..., n!`.
///
/// Each call to [`Iterator::next`] performs exactly one multiplication, so the
/// amount of work done is always the number of elements pulled so far.
/// Dropping the streamer early is the cancellation mechanism: there is no
/// background work to stop and nothing to clean up.
///
/// The accumulator is an `i64`. The first step whose product does not fit
/// (`21!`) yields [`Error::Overflow`] instead of a wrapped value, after which
/// the iterator is exhausted. Steps yielded before the error remain valid.
///
/// # Example
///
/// ```
/// use abacus::{FactorialStep, FactorialStreamer};
///
/// let mut streamer = FactorialStreamer::new(3)?;
/// assert_eq!(streamer.next(), Some(Ok(FactorialStep { step: 1, accumulator: 1 })));
/// assert_eq!(streamer.next(), Some(Ok(FactorialStep { step: 2, accumulator: 2 })));
/// assert_eq!(streamer.next(), Some(Ok(FactorialStep { step: 3, accumulator: 6 })));
/// assert_eq!(streamer.next(), None);
/// # Ok::<(), abacus::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FactorialStreamer {
    target: i32,
    step: i32,
    accumulator: i64,
    failed: bool,
}

impl FactorialStreamer {
    /// Largest `n` whose factorial fits in the `i64` accumulator.
    pub const MAX_REPRESENTABLE: i32 = 20;

    /// Creates a streamer that will yield `n` steps.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `n` is negative.
    pub fn new(n: i32) -> Result<Self> {
        if n < 0 {
            return Err(Error::invalid(
                Operation::Factorial,
                "negative factorial is undefined",
            ));
        }

        Ok(Self {
            target: n,
            step: 0,
            accumulator: 1,
            failed: false,
        })
    }

    /// Number of steps computed so far.
    pub const fn steps_computed(&self) -> i32 {
        self.step
    }

    /// Returns `true` once the stream has yielded its last element or its
    /// overflow error.
    pub const fn is_finished(&self) -> bool {
        self.failed || self.step >= self.target
    }
}

impl Iterator for FactorialStreamer {
    type Item = Result<FactorialStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_finished() {
            return None;
        }

        let next = self.step + 1;
        match self.accumulator.checked_mul(i64::from(next)) {
            Some(accumulator) => {
                self.step = next;
                self.accumulator = accumulator;
                Some(Ok(FactorialStep {
                    step: next,
                    accumulator,
                }))
            }
            None => {
                self.failed = true;
                Some(Err(Error::overflow(Operation::Factorial)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.is_finished() {
            return (0, Some(0));
        }
        let remaining = (self.target - self.step) as usize;
        // Past `MAX_REPRESENTABLE` the stream ends with a single error item.
        let reachable = (Self::MAX_REPRESENTABLE - self.step).max(0) as usize + 1;
        let upper = remaining.min(reachable);
        (upper, Some(upper))
    }
}

impl ExactSizeIterator for FactorialStreamer {}

impl FusedIterator for FactorialStreamer {}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step: i32, accumulator: i64) -> Result<FactorialStep> {
        Ok(FactorialStep { step, accumulator })
    }

    #[test]
    fn five_yields_exact_sequence() {
        let steps: Vec<_> = FactorialStreamer::new(5).unwrap().collect();
        assert_eq!(
            steps,
            [step(1, 1), step(2, 2), step(3, 6), step(4, 24), step(5, 120)]
        );
    }

    #[test]
    fn zero_yields_nothing() {
        let mut streamer = FactorialStreamer::new(0).unwrap();
        assert!(streamer.is_finished());
        assert_eq!(streamer.len(), 0);
        assert_eq!(streamer.next(), None);
    }

    #[test]
    fn negative_target_is_invalid() {
        assert!(matches!(
            FactorialStreamer::new(-1),
            Err(Error::InvalidArgument {
                operation: Operation::Factorial,
                ..
            })
        ));
        assert!(FactorialStreamer::new(i32::MIN).is_err());
    }

    #[test]
    fn steps_strictly_increase_and_match_recurrence() {
        let mut prev = FactorialStep {
            step: 0,
            accumulator: 1,
        };
        for item in FactorialStreamer::new(FactorialStreamer::MAX_REPRESENTABLE).unwrap() {
            let item = item.unwrap();
            assert_eq!(item.step, prev.step + 1);
            assert_eq!(item.accumulator, prev.accumulator * i64::from(item.step));
            prev = item;
        }
        assert_eq!(prev.step, 20);
        assert_eq!(prev.accumulator, 2_432_902_008_176_640_000);
    }

    #[test]
    fn overflow_keeps_prior_steps_and_stops() {
        let mut streamer = FactorialStreamer::new(25).unwrap();
        assert_eq!(streamer.len(), 21);

        let ok: Vec<_> = streamer.by_ref().take(20).collect();
        assert!(ok.iter().all(Result::is_ok));

        assert_eq!(
            streamer.next(),
            Some(Err(Error::Overflow {
                operation: Operation::Factorial
            }))
        );
        assert!(streamer.is_finished());
        assert_eq!(streamer.next(), None);
        assert_eq!(streamer.next(), None);
        assert_eq!(streamer.steps_computed(), 20);
    }

    #[test]
    fn work_is_proportional_to_pulls() {
        let mut streamer = FactorialStreamer::new(10).unwrap();
        assert_eq!(streamer.steps_computed(), 0);

        let pulled: Vec<_> = streamer.by_ref().take(2).collect();
        assert_eq!(pulled, [step(1, 1), step(2, 2)]);
        assert_eq!(streamer.steps_computed(), 2);
        assert!(!streamer.is_finished());
        assert_eq!(streamer.len(), 8);
    }

    #[test]
    fn huge_target_is_bounded_by_overflow() {
        let streamer = FactorialStreamer::new(i32::MAX).unwrap();
        assert_eq!(streamer.len(), 21);
        assert_eq!(streamer.filter(Result::is_err).count(), 1);
    }
}
