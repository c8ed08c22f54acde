//! Infrastructure adapters for external systems.

pub mod inference;
pub mod sqlite;
