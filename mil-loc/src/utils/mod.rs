//! Misc utilities.

mod tensor;

pub use tensor::*;
