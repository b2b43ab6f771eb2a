//! Fixed-size batch generation from instance tables.

mod generator;

pub use generator::*;
