use std::env;
use std::path::PathBuf;

/// Builds the gRPC client and server code for the `abacus.proto` definition
/// using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`. An encoded file descriptor set is written alongside so
/// the server can expose gRPC reflection.
///
/// # Files and Paths
///
/// - Proto file: `proto/abacus.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/abacus_descriptor.bin`
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("abacus");
/// }
/// ```
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/abacus.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("abacus_descriptor.bin");

    tonic_prost_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&["proto/abacus.proto"], &["proto"])?;

    Ok(())
}
