//! CLI command implementations.

pub mod ledger;
pub mod select;
