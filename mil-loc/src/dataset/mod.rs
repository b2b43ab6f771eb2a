//! Instance tables and fold splitting.

mod csv;
mod fold;
mod record;
mod table;

pub use self::csv::*;
pub use fold::*;
pub use record::*;
pub use table::*;
