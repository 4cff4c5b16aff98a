//! Overflow-checked arithmetic over the `i32` operands of the service
//! contract.
//!
//! Every function is pure and total: it either returns the exact
//! mathematical result or an [`Error`]. Nothing wraps, saturates or panics.

use crate::{Error, Operation, Result};

/// Quotient and remainder of a truncating integer division.
///
/// The quotient is rounded toward zero and the remainder carries the sign of
/// the dividend, so `dividend == quotient * divisor + remainder` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotient {
    pub quotient: i32,
    pub remainder: i32,
}

/// Returns `x + y`.
///
/// # Errors
///
/// [`Error::Overflow`] if the sum does not fit in an `i32`.
pub fn add(x: i32, y: i32) -> Result<i32> {
    x.checked_add(y)
        .ok_or(Error::overflow(Operation::Add))
}

/// Returns `x - y`.
///
/// # Errors
///
/// [`Error::Overflow`] if the difference does not fit in an `i32`.
pub fn subtract(x: i32, y: i32) -> Result<i32> {
    x.checked_sub(y)
        .ok_or(Error::overflow(Operation::Subtract))
}

/// Returns `x * y`.
///
/// # Errors
///
/// [`Error::Overflow`] if the product does not fit in an `i32`.
pub fn multiply(x: i32, y: i32) -> Result<i32> {
    x.checked_mul(y)
        .ok_or(Error::overflow(Operation::Multiply))
}

/// Divides `x` by `y`, truncating toward zero.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `y == 0`.
/// - [`Error::Overflow`] for `i32::MIN / -1`, whose quotient is `2^31`.
///
/// # Example
///
/// ```
/// use abacus::{divide, Quotient};
///
/// assert_eq!(divide(-7, 2)?, Quotient { quotient: -3, remainder: -1 });
/// # Ok::<(), abacus::Error>(())
/// ```
pub fn divide(x: i32, y: i32) -> Result<Quotient> {
    if y == 0 {
        return Err(Error::invalid(
            Operation::Divide,
            "division by zero is not allowed",
        ));
    }

    // Rust's `/` and `%` already truncate toward zero; the checked variants
    // only reject `i32::MIN / -1`.
    let quotient = x
        .checked_div(y)
        .ok_or(Error::overflow(Operation::Divide))?;
    let remainder = x
        .checked_rem(y)
        .ok_or(Error::overflow(Operation::Divide))?;

    Ok(Quotient {
        quotient,
        remainder,
    })
}

/// Raises `base` to `exponent` by repeated multiplication.
///
/// `power(x, 0)` is `1` for every `x`, `0^0` included.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `exponent` is negative; the integer reply
///   cannot represent a fractional result.
/// - [`Error::Overflow`] as soon as a partial product leaves the `i32` range.
pub fn power(base: i32, exponent: i32) -> Result<i32> {
    if exponent < 0 {
        return Err(Error::invalid(
            Operation::Power,
            "exponent must be non-negative",
        ));
    }

    // The only bases whose powers stay bounded. Everything else overflows
    // within 32 multiplications, which bounds the loop below.
    match base {
        0 => return Ok(i32::from(exponent == 0)),
        1 => return Ok(1),
        -1 => return Ok(if exponent % 2 == 0 { 1 } else { -1 }),
        _ => {}
    }

    let mut acc: i32 = 1;
    for _ in 0..exponent {
        acc = acc
            .checked_mul(base)
            .ok_or(Error::overflow(Operation::Power))?;
    }
    Ok(acc)
}
