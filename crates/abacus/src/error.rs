use crate::Operation;

/// A result type defaulting to the crate [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the calculator core can produce.
///
/// Both variants describe a property of the *input*: the core never fails for
/// any other reason. They are therefore cheap to clone and compare.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The operands are well-typed but invalid for the operation, e.g. a zero
    /// divisor, a negative exponent or an empty statistics stream.
    #[error("{operation}: {reason}")]
    InvalidArgument {
        operation: Operation,
        reason: &'static str,
    },

    /// The exact result does not fit the fixed-width type of the reply.
    #[error("{operation}: result overflows the reply type")]
    Overflow { operation: Operation },
}

impl Error {
    pub(crate) const fn invalid(operation: Operation, reason: &'static str) -> Self {
        Self::InvalidArgument { operation, reason }
    }

    pub(crate) const fn overflow(operation: Operation) -> Self {
        Self::Overflow { operation }
    }

    /// The operation that produced this error.
    pub const fn operation(&self) -> Operation {
        match self {
            Self::InvalidArgument { operation, .. } | Self::Overflow { operation } => *operation,
        }
    }
}
