//! Core error taxonomy shared by the token codec, session gate, entity store
//! and booking scheduler.
//!
//! Every core operation returns `Result<_, CoreError>`; the HTTP layer maps the
//! variant to a status code and the uniform JSON envelope.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed input
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Booking date cannot be in the past")]
    PastDate,

    #[error("The selected time slot ({date} at {time}) is already booked")]
    SlotConflict { date: String, time: String },

    #[error("Cannot change booking status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violation on create/update (slug, email)
    #[error("{0}")]
    Conflict(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation_error",
            CoreError::PastDate => "past_date",
            CoreError::SlotConflict { .. } => "slot_conflict",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::Persistence(_) => "persistence_error",
            CoreError::InvalidToken => "invalid_token",
            CoreError::Config(_) => "config_error",
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.message().contains("UNIQUE constraint failed") {
                return CoreError::Conflict(
                    "A record with this identifier already exists".to_string(),
                );
            }
        }
        tracing::error!(error = %err, "Database error");
        CoreError::Persistence(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for CoreError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(error = %err, "Token rejected");
        CoreError::InvalidToken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(CoreError::PastDate.code(), "past_date");
        assert_eq!(
            CoreError::SlotConflict {
                date: "2025-06-01".into(),
                time: "10:00 AM".into()
            }
            .code(),
            "slot_conflict"
        );
        assert_eq!(CoreError::validation("email", "bad").code(), "validation_error");
        assert_eq!(CoreError::InvalidToken.code(), "invalid_token");
    }

    #[test]
    fn test_slot_conflict_message_names_the_slot() {
        let err = CoreError::SlotConflict {
            date: "2025-06-01".into(),
            time: "10:00 AM".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-06-01"));
        assert!(msg.contains("10:00 AM"));
    }

    #[test]
    fn test_row_not_found_is_persistence() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CoreError::Persistence(_)));
    }
}
