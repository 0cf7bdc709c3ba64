use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::JsonBody;
use crate::notifications::ContactEmail;
use crate::validation::validate_email;
use crate::AppState;

const MAX_MESSAGE_LENGTH: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
}

fn validate_contact(request: &ContactRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if request.name.trim().is_empty() {
        errors.add("name", "Name is required");
    }
    errors.check("email", validate_email(request.email.trim()));
    if request.message.trim().is_empty() {
        errors.add("message", "Message is required");
    } else if request.message.len() > MAX_MESSAGE_LENGTH {
        errors.add(
            "message",
            format!("Message is too long (max {} characters)", MAX_MESSAGE_LENGTH),
        );
    }

    errors.finish()
}

/// Public contact form. Rate limiting is applied by the route layer.
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<ContactRequest>,
) -> Result<Json<ContactResponse>, ApiError> {
    validate_contact(&request)?;

    let contact = ContactEmail {
        name: request.name.trim().to_string(),
        email: request.email.trim().to_string(),
        subject: request
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        message: request.message.trim().to_string(),
    };

    if let Err(e) = state.notifier.send_contact_email(&contact).await {
        tracing::error!(from = %contact.email, error = %e, "Failed to forward contact message");
        return Err(ApiError::external(
            "Your message could not be delivered. Please try again later.",
        ));
    }

    tracing::info!(from = %contact.email, "Contact message forwarded");
    Ok(Json(ContactResponse {
        success: true,
        message: "Thanks for reaching out. We will get back to you soon.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, message: &str) -> ContactRequest {
        ContactRequest {
            name: name.into(),
            email: email.into(),
            subject: None,
            message: message.into(),
        }
    }

    #[test]
    fn test_valid_contact_passes() {
        assert!(validate_contact(&request("Ada", "ada@example.com", "Hello")).is_ok());
    }

    #[test]
    fn test_all_problems_reported_together() {
        let err = validate_contact(&request(" ", "not-an-email", "")).unwrap_err();
        assert!(err.message().contains("3 fields"));
    }

    #[test]
    fn test_overlong_message_rejected() {
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(validate_contact(&request("Ada", "ada@example.com", &long)).is_err());
    }
}
