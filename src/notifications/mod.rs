//! Outbound notifications for bookings and the contact form.
//!
//! The core only talks to the [`Notifier`] trait. [`email::SmtpNotifier`]
//! delivers through an SMTP relay; [`LogNotifier`] stands in when no relay is
//! configured so development setups keep working.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::EmailConfig;
use crate::db::ServiceBooking;

pub use email::SmtpNotifier;

/// Booking details rendered into confirmation and admin emails
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEmail {
    pub booking_id: String,
    pub service_name: String,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub company: Option<String>,
    pub booking_date: String,
    pub preferred_time: String,
    pub timezone: String,
    pub duration: i64,
    pub message: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
}

impl From<&ServiceBooking> for BookingEmail {
    fn from(booking: &ServiceBooking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            service_name: booking.service_name.clone(),
            client_name: booking.client_name.clone(),
            client_email: booking.client_email.clone(),
            client_phone: booking.client_phone.clone(),
            company: booking.company.clone(),
            booking_date: booking.booking_date.clone(),
            preferred_time: booking.preferred_time.clone(),
            timezone: booking.timezone.clone(),
            duration: booking.duration,
            message: booking.message.clone(),
            meeting_link: booking.meeting_link.clone(),
            notes: booking.notes.clone(),
        }
    }
}

/// A contact form submission forwarded to the agency inbox
#[derive(Debug, Clone, Serialize)]
pub struct ContactEmail {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the client their booking was received or confirmed
    async fn send_booking_confirmation_email(&self, booking: &BookingEmail) -> Result<()>;

    /// Tell the agency a new booking arrived
    async fn send_service_booking_email(&self, booking: &BookingEmail) -> Result<()>;

    async fn send_contact_email(&self, contact: &ContactEmail) -> Result<()>;
}

/// Logs every notification and reports success
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_booking_confirmation_email(&self, booking: &BookingEmail) -> Result<()> {
        tracing::info!(
            booking_id = %booking.booking_id,
            to = %booking.client_email,
            "Email not configured, skipping booking confirmation"
        );
        Ok(())
    }

    async fn send_service_booking_email(&self, booking: &BookingEmail) -> Result<()> {
        tracing::info!(
            booking_id = %booking.booking_id,
            service = %booking.service_name,
            date = %booking.booking_date,
            time = %booking.preferred_time,
            "Email not configured, skipping admin booking notice"
        );
        Ok(())
    }

    async fn send_contact_email(&self, contact: &ContactEmail) -> Result<()> {
        tracing::info!(
            from = %contact.email,
            subject = ?contact.subject,
            "Email not configured, skipping contact message"
        );
        Ok(())
    }
}

/// SMTP when configured, otherwise log-only
pub fn from_config(config: &EmailConfig) -> Arc<dyn Notifier> {
    if config.is_configured() {
        tracing::info!(
            host = ?config.smtp_host,
            port = config.smtp_port,
            "Email notifications enabled"
        );
        Arc::new(SmtpNotifier::new(config.clone()))
    } else {
        tracing::warn!("SMTP not configured, notifications will only be logged");
        Arc::new(LogNotifier)
    }
}
