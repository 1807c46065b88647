//! Record module: listings as rows
//!
//! - `FlatRow`: an ordered, single-level mapping of column name to scalar
//! - `Flattener`: nested listing → `FlatRow`
//! - `normalize_scalar`: "not a number" sentinel handling

mod flatten;
mod row;

pub use flatten::{normalize_scalar, Flattener, SCALAR_LISTING_KEY};
pub use row::FlatRow;
