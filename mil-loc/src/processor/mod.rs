//! Image loading and normalization.

mod image_loader;
mod normalize;

pub use image_loader::*;
pub use normalize::*;
