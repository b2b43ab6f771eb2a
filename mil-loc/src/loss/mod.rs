//! Multi-instance pooling operators and the custom function registry.

mod pooling;

pub use pooling::*;
