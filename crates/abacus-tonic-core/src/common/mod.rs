//! Shared protocol types and error definitions used by the `abacus` server
//! and client.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping onto gRPC status codes.
//! - [`convert`] - Conversions between generated messages and core types.
//! - [`proto`] - Generated Protobuf service and message definitions.

pub mod convert;
pub mod error;

pub use error::*;

/// gRPC service and message definitions generated from `proto/abacus.proto`.
///
/// ## Services
///
/// - `Calculator` - unary `Add`, `Subtract`, `Multiply`, `Divide`, `Power`
///   and the server-streaming `Factorial`.
/// - `Stats` - the client-streaming `DescriptiveStats`.
///
/// [`FILE_DESCRIPTOR_SET`] holds the encoded descriptors for gRPC server
/// reflection.
pub mod proto {
    tonic::include_proto!("abacus");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("abacus_descriptor");
}
