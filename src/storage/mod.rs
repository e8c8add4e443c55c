mod config;
mod error;
mod queries;
mod repository;
mod tx;

pub use config::*;
pub use error::*;
pub use repository::*;
pub use tx::*;

/// SQL migration for the accounts, entries and transfers tables
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
