//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?active=true` narrows employee listings to active employees.
#[derive(Debug, Default, Deserialize)]
pub struct ActiveFilter {
    #[serde(default)]
    pub active: bool,
}
