//! Row structs.
//!
//! Each submodule contains a `FromRow` struct matching the table's columns
//! and a `TryFrom` conversion into the `agency-core` domain type. Status
//! columns are stored as text and parsed on the way out.

pub mod employee;
pub mod sequence;
pub mod template;
pub mod workflow;

use agency_core::error::CoreError;
use agency_core::repository::StoreError;

/// A row that no longer parses into its domain type.
pub(crate) fn corrupt_row(table: &str, err: CoreError) -> StoreError {
    StoreError::Backend(format!("Unreadable {table} row: {err}"))
}
