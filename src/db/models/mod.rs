//! Database models split into domain-specific modules.

pub mod admin;
pub mod booking;
pub mod client;
pub mod content;
pub mod milestone;
pub mod project;
pub mod project_file;

pub use admin::*;
pub use booking::*;
pub use client::*;
pub use content::*;
pub use milestone::*;
pub use project::*;
pub use project_file::*;

use super::store::{FieldValue, Fields};

/// Append `column = value` when the patch supplied a value
pub(crate) fn set_if_some<V: Into<FieldValue>>(
    fields: &mut Fields,
    column: &'static str,
    value: Option<V>,
) {
    if let Some(v) = value {
        fields.push((column, v.into()));
    }
}

/// Empty strings from forms mean "not provided"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
