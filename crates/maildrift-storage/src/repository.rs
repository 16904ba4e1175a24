//! Repository layer for data access

pub mod state_rows;

// Re-export the row-source interface and its database implementation
pub use state_rows::{DbRowSource, RowSource};
