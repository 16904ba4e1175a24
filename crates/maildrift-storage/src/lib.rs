//! Maildrift Storage - Backing-store access layer
//!
//! This crate provides the database pool, the row models, and the
//! row-source repository the mailbox-state cache consumes.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
