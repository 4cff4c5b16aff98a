//! Error types for the calculator service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of a call. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate errors with `?` and clients
//! receive a status code that tells them whether to fix their input.
//!
//! ## Error Cases
//! - `Compute`: the core rejected the operands or the result overflowed.
//! - `ReplyShape`: a unary result could not be encoded in the requested reply
//!   message (a routing bug, never caused by input).
//! - `ServiceShutdown`: a call arrived, or was still running, while the
//!   service was shutting down.

use abacus::Operation;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the calculator service.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The core computation failed.
    #[error(transparent)]
    Compute(#[from] abacus::Error),

    /// The evaluated reply does not match the reply message of the RPC.
    #[error("{operation} produced a reply that does not fit {expected}")]
    ReplyShape {
        operation: Operation,
        expected: &'static str,
    },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// The operation the error refers to, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Compute(e) => Some(e.operation()),
            Self::ReplyShape { operation, .. } => Some(*operation),
            Self::ServiceShutdown => None,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Compute(e @ abacus::Error::InvalidArgument { .. }) => {
                Status::invalid_argument(e.to_string())
            }
            Error::Compute(e @ abacus::Error::Overflow { .. }) => {
                Status::out_of_range(e.to_string())
            }
            Error::Compute(e) => Status::internal(e.to_string()),
            e @ Error::ReplyShape { .. } => Status::internal(e.to_string()),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn compute_errors_map_to_client_codes() {
        let invalid: Status = Error::from(abacus::divide(1, 0).unwrap_err()).into();
        assert_eq!(invalid.code(), Code::InvalidArgument);
        assert_eq!(invalid.message(), "Divide: division by zero is not allowed");

        let overflow: Status = Error::from(abacus::add(i32::MAX, 1).unwrap_err()).into();
        assert_eq!(overflow.code(), Code::OutOfRange);
        assert!(overflow.message().starts_with("Add:"));
    }

    #[test]
    fn operational_errors_map_to_server_codes() {
        let shutdown: Status = Error::ServiceShutdown.into();
        assert_eq!(shutdown.code(), Code::Unavailable);

        let shape: Status = Error::ReplyShape {
            operation: Operation::Divide,
            expected: "BinaryReply",
        }
        .into();
        assert_eq!(shape.code(), Code::Internal);
    }

    #[test]
    fn operation_is_exposed() {
        let err = Error::from(abacus::power(2, -1).unwrap_err());
        assert_eq!(err.operation(), Some(Operation::Power));
        assert_eq!(Error::ServiceShutdown.operation(), None);
    }
}
