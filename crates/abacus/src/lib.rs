#![doc = include_str!("../README.md")]

mod arithmetic;
mod call;
mod error;
mod factorial;
mod operation;
mod stats;

pub use crate::arithmetic::*;
pub use crate::call::*;
pub use crate::error::*;
pub use crate::factorial::*;
pub use crate::operation::*;
pub use crate::stats::*;
