//! Misc utilities.

mod checkpoint;
mod lr_scheduler;
mod rate_counter;

pub use checkpoint::*;
pub use lr_scheduler::*;
pub use rate_counter::*;

pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";
