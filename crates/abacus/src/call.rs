//! Routing of unary calls to the arithmetic functions.
//!
//! A [`UnaryCall`] is the decoded form of one unary request: the operation
//! plus its operands. [`UnaryCall::evaluate`] dispatches it to the matching
//! checked function ([`add`], [`divide`], ...) and wraps the result in a
//! [`UnaryReply`]. Unary calls carry no state, so nothing is constructed
//! beyond the call value itself.

use crate::{Operation, Quotient, Result, add, divide, multiply, power, subtract};
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryCall {
    Add { x: i32, y: i32 },
    Subtract { x: i32, y: i32 },
    Multiply { x: i32, y: i32 },
    Divide { x: i32, y: i32 },
    Power { base: i32, exponent: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryReply {
    Value(i32),
    Quotient(Quotient),
}

impl UnaryCall {
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Add { .. } => Operation::Add,
            Self::Subtract { .. } => Operation::Subtract,
            Self::Multiply { .. } => Operation::Multiply,
            Self::Divide { .. } => Operation::Divide,
            Self::Power { .. } => Operation::Power,
        }
    }

    /// Runs the call.
    ///
    /// # Errors
    ///
    /// Whatever the underlying arithmetic function reports.
    pub fn evaluate(self) -> Result<UnaryReply> {
        match self {
            Self::Add { x, y } => add(x, y).map(UnaryReply::Value),
            Self::Subtract { x, y } => subtract(x, y).map(UnaryReply::Value),
            Self::Multiply { x, y } => multiply(x, y).map(UnaryReply::Value),
            Self::Divide { x, y } => divide(x, y).map(UnaryReply::Quotient),
            Self::Power { base, exponent } => power(base, exponent).map(UnaryReply::Value),
        }
    }
}

impl fmt::Display for UnaryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { x, y } => write!(f, "{x} + {y}"),
            Self::Subtract { x, y } => write!(f, "{x} - {y}"),
            Self::Multiply { x, y } => write!(f, "{x} * {y}"),
            Self::Divide { x, y } => write!(f, "{x} / {y}"),
            Self::Power { base, exponent } => write!(f, "{base}^{exponent}"),
        }
    }
}

impl fmt::Display for UnaryReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "= {v}"),
            Self::Quotient(Quotient {
                quotient,
                remainder,
            }) => write!(f, "q={quotient} r={remainder}"),
        }
    }
}
