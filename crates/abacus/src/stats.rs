use crate::{Error, Operation, Result};

/// Final output of a [`StatsAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub mean: f64,
    /// Population variance: the sum of squared deviations divided by `count`.
    pub variance: f64,
}

/// Single-pass mean and variance using Welford's online algorithm.
///
/// Values are folded in as they arrive and never stored, so memory use is
/// constant regardless of stream length. Each update uses the two-delta form
///
/// ```text
/// count += 1
/// delta  = v - mean
/// mean  += delta / count
/// delta2 = v - mean          (with the updated mean)
/// m2    += delta * delta2
/// ```
///
/// which avoids the catastrophic cancellation of the naive
/// `sum_of_squares / n - mean^2` formulation.
///
/// An accumulator is owned by a single call and mutated through `&mut self`;
/// it is never shared between producers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsAccumulator {
    count: u64,
    mean: f64,
    sum_squared_delta: f64,
}

impl StatsAccumulator {
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sum_squared_delta: 0.0,
        }
    }

    /// Folds one value into the running state.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `value` is `NaN` or infinite. The state is
    /// left untouched in that case.
    pub fn push(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::invalid(
                Operation::DescriptiveStats,
                "values must be finite",
            ));
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.sum_squared_delta += delta * delta2;
        Ok(())
    }

    /// Folds another accumulator into this one (Chan et al. pairwise update).
    ///
    /// The result is the same as if every value pushed into `other` had been
    /// pushed into `self`, up to floating-point rounding.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let (n_a, n_b, n) = (self.count as f64, other.count as f64, count as f64);

        self.mean += delta * n_b / n;
        self.sum_squared_delta += other.sum_squared_delta + delta * delta * n_a * n_b / n;
        self.count = count;
    }

    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Running mean, or `None` before the first value.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Summarizes the values seen so far without consuming the accumulator.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if no value was pushed.
    /// - [`Error::Overflow`] if the mean or variance exceeded the `f64` range.
    pub fn summary(&self) -> Result<Summary> {
        if self.count == 0 {
            return Err(Error::invalid(
                Operation::DescriptiveStats,
                "no values supplied",
            ));
        }

        let variance = self.sum_squared_delta / self.count as f64;
        if !self.mean.is_finite() || !variance.is_finite() {
            return Err(Error::overflow(Operation::DescriptiveStats));
        }

        Ok(Summary {
            count: self.count,
            mean: self.mean,
            variance,
        })
    }

    /// Pushes values in order, stopping at the first one [`push`] rejects.
    ///
    /// Values before the rejected one stay folded in.
    ///
    /// # Errors
    ///
    /// The error of the first rejected value.
    ///
    /// [`push`]: StatsAccumulator::push
    pub fn try_extend<I: IntoIterator<Item = f64>>(&mut self, values: I) -> Result<()> {
        values.into_iter().try_for_each(|value| self.push(value))
    }

    /// Consumes the accumulator and returns its final summary.
    ///
    /// # Errors
    ///
    /// See [`StatsAccumulator::summary`].
    pub fn finish(self) -> Result<Summary> {
        self.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn summarize(values: &[f64]) -> Result<Summary> {
        let mut acc = StatsAccumulator::new();
        for &v in values {
            acc.push(v)?;
        }
        acc.finish()
    }

    fn closed_form(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, variance)
    }

    #[test]
    fn textbook_example() {
        let summary = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < EPS);
        assert!((summary.variance - 4.0).abs() < EPS);
    }

    #[test]
    fn empty_stream_is_invalid() {
        let err = StatsAccumulator::new().finish().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument {
                operation: Operation::DescriptiveStats,
                ..
            }
        ));
    }

    #[test]
    fn single_value_has_zero_variance() {
        for v in [0.0, -3.5, 42.0, 1e300, f64::MIN_POSITIVE] {
            let summary = summarize(&[v]).unwrap();
            assert_eq!(summary.mean, v);
            assert_eq!(summary.variance, 0.0);
        }
    }

    #[test]
    fn matches_closed_form() {
        let values: Vec<f64> = (0..1000)
            .map(|i| f64::from(i).sin() * 100.0 + f64::from(i % 7))
            .collect();
        let (mean, variance) = closed_form(&values);
        let summary = summarize(&values).unwrap();
        assert!((summary.mean - mean).abs() < EPS);
        assert!((summary.variance - variance).abs() < 1e-6);
    }

    #[test]
    fn stable_with_large_offset() {
        // The naive sum-of-squares formula loses every significant digit here.
        let offset = 1e9;
        let values = [offset + 4.0, offset + 7.0, offset + 13.0, offset + 16.0];
        let summary = summarize(&values).unwrap();
        assert!((summary.mean - (offset + 10.0)).abs() < 1e-6);
        assert!((summary.variance - 22.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_non_finite_without_touching_state() {
        let mut acc = StatsAccumulator::new();
        acc.push(1.0).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                acc.push(bad),
                Err(Error::InvalidArgument { .. })
            ));
        }
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.mean(), Some(1.0));
    }

    #[test]
    fn variance_beyond_f64_overflows() {
        let err = summarize(&[-1e300, 1e300]).unwrap_err();
        assert_eq!(
            err,
            Error::Overflow {
                operation: Operation::DescriptiveStats
            }
        );
    }

    #[test]
    fn try_extend_stops_at_first_non_finite_value() {
        let mut acc = StatsAccumulator::new();
        let err = acc.try_extend([1.0, f64::NAN, 3.0]).unwrap_err();

        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.mean(), Some(1.0));

        let mut acc = StatsAccumulator::new();
        assert!(acc.try_extend([2.0, f64::NEG_INFINITY]).is_err());
        assert_eq!(acc.count(), 1);
    }

    #[test]
    fn merge_equals_sequential() {
        let values: Vec<f64> = (1..=50).map(|i| f64::from(i) * 0.75).collect();
        let (left, right) = values.split_at(17);

        let mut a = StatsAccumulator::new();
        a.try_extend(left.iter().copied()).unwrap();
        let mut b = StatsAccumulator::new();
        b.try_extend(right.iter().copied()).unwrap();
        a.merge(&b);

        let merged = a.finish().unwrap();
        let sequential = summarize(&values).unwrap();
        assert_eq!(merged.count, sequential.count);
        assert!((merged.mean - sequential.mean).abs() < EPS);
        assert!((merged.variance - sequential.variance).abs() < EPS);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let mut a = StatsAccumulator::new();
        a.try_extend([1.0, 2.0, 3.0]).unwrap();
        let before = a;
        a.merge(&StatsAccumulator::new());
        assert_eq!(a, before);

        let mut empty = StatsAccumulator::new();
        empty.merge(&before);
        assert_eq!(empty, before);
    }
}
