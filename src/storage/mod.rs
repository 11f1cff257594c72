mod memory;
mod sqlite;

pub use memory::*;
pub use sqlite::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
