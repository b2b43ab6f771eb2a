//! The building blocks of weakly-supervised patch localization training.

mod common;
pub mod batch;
pub mod dataset;
pub mod loss;
pub mod model;
pub mod processor;
pub mod utils;
