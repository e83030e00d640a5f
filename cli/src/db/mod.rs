//! Database module for SQLite persistence.

mod pool;
pub mod rows;
pub mod schema;

pub use pool::*;
