//! Conversions between the generated Protobuf messages and [`abacus`] types.
//!
//! Requests convert into [`UnaryCall`] descriptors through the
//! `into_*_call` helpers; replies convert from the core results. Unary
//! replies use `TryFrom` because a single [`UnaryReply`] type serves both
//! `BinaryReply` and `DivideReply`.

use crate::{
    Error,
    proto::{BinaryReply, BinaryRequest, DivideReply, FactorialStep, PowerRequest, StatsReply},
};
use abacus::{Quotient, Summary, UnaryCall, UnaryReply};

impl BinaryRequest {
    pub fn into_add_call(self) -> UnaryCall {
        UnaryCall::Add {
            x: self.x,
            y: self.y,
        }
    }

    pub fn into_subtract_call(self) -> UnaryCall {
        UnaryCall::Subtract {
            x: self.x,
            y: self.y,
        }
    }

    pub fn into_multiply_call(self) -> UnaryCall {
        UnaryCall::Multiply {
            x: self.x,
            y: self.y,
        }
    }

    pub fn into_divide_call(self) -> UnaryCall {
        UnaryCall::Divide {
            x: self.x,
            y: self.y,
        }
    }
}

impl From<PowerRequest> for UnaryCall {
    fn from(req: PowerRequest) -> Self {
        Self::Power {
            base: req.base,
            exponent: req.exponent,
        }
    }
}

impl From<abacus::FactorialStep> for FactorialStep {
    fn from(step: abacus::FactorialStep) -> Self {
        Self {
            step: step.step,
            accumulator: step.accumulator,
        }
    }
}

impl From<Quotient> for DivideReply {
    fn from(q: Quotient) -> Self {
        Self {
            quotient: q.quotient,
            remainder: q.remainder,
        }
    }
}

impl From<Summary> for StatsReply {
    fn from(summary: Summary) -> Self {
        Self {
            mean: summary.mean,
            variance: summary.variance,
        }
    }
}

impl TryFrom<UnaryReply> for BinaryReply {
    type Error = Error;

    fn try_from(reply: UnaryReply) -> Result<Self, Self::Error> {
        match reply {
            UnaryReply::Value(result) => Ok(Self { result }),
            UnaryReply::Quotient(_) => Err(Error::ReplyShape {
                operation: abacus::Operation::Divide,
                expected: "BinaryReply",
            }),
        }
    }
}

impl TryFrom<UnaryReply> for DivideReply {
    type Error = Error;

    fn try_from(reply: UnaryReply) -> Result<Self, Self::Error> {
        match reply {
            UnaryReply::Quotient(q) => Ok(q.into()),
            // Any value-shaped reply comes from a non-divide call; report the
            // mismatch against the message that was expected.
            UnaryReply::Value(_) => Err(Error::ReplyShape {
                operation: abacus::Operation::Divide,
                expected: "DivideReply",
            }),
        }
    }
}
