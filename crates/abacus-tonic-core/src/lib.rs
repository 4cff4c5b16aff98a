#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can access the core via
// `abacus_tonic_core::abacus`
pub use abacus;
