//! Consultation bookings and their status machine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_empty, set_if_some};
use crate::db::store::{Entity, FieldValue, Fields, NewRecord, PatchRecord};
use crate::error::{CoreError, CoreResult};
use crate::validation::{parse_iso_date, validate_email};

pub const DEFAULT_DURATION_MINUTES: i64 = 30;
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Legal moves between distinct states. Same-state requests are handled
    /// by the scheduler and never reach this check.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Unknown booking status: {}", s)),
        }
    }
}

impl From<BookingStatus> for FieldValue {
    fn from(status: BookingStatus) -> Self {
        FieldValue::from(status.to_string())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBooking {
    pub id: String,
    pub service_id: String,
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
    pub status: BookingStatus,
    pub confirmed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for ServiceBooking {
    const TABLE: &'static str = "service_bookings";
    const KIND: &'static str = "Booking";
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["client_name", "client_email", "service_name", "company"];
    const SORT_COLUMNS: &'static [&'static str] = &[
        "created_at",
        "updated_at",
        "booking_date",
        "client_name",
        "status",
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

/// Public booking submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceBooking {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub client_email: String,
    pub client_phone: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub booking_date: String,
    #[serde(default)]
    pub preferred_time: String,
    pub timezone: Option<String>,
    pub duration: Option<i64>,
    pub message: Option<String>,
}

impl NewServiceBooking {
    /// Required fields that are absent or blank, in payload order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("serviceId", &self.service_id),
            ("serviceName", &self.service_name),
            ("clientName", &self.client_name),
            ("clientEmail", &self.client_email),
            ("bookingDate", &self.booking_date),
            ("preferredTime", &self.preferred_time),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

impl NewRecord for NewServiceBooking {
    type Entity = ServiceBooking;

    fn validate(&self) -> CoreResult<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::Validation {
                field: None,
                message: format!("Missing required fields: {}", missing.join(", ")),
            });
        }

        validate_email(self.client_email.trim())
            .map_err(|message| CoreError::validation("clientEmail", message))?;
        parse_iso_date(self.booking_date.trim())
            .map_err(|message| CoreError::validation("bookingDate", message))?;

        if let Some(duration) = self.duration {
            if duration <= 0 {
                return Err(CoreError::validation(
                    "duration",
                    "Duration must be a positive number of minutes",
                ));
            }
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("service_id", FieldValue::from(self.service_id.trim())),
            ("service_name", FieldValue::from(self.service_name.trim())),
            ("client_name", FieldValue::from(self.client_name.trim())),
            ("client_email", FieldValue::from(self.client_email.trim())),
            ("client_phone", FieldValue::from(non_empty(self.client_phone))),
            ("company", FieldValue::from(non_empty(self.company))),
            ("booking_date", FieldValue::from(self.booking_date.trim())),
            ("preferred_time", FieldValue::from(self.preferred_time.trim())),
            (
                "timezone",
                FieldValue::from(
                    non_empty(self.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
                ),
            ),
            (
                "duration",
                FieldValue::from(self.duration.unwrap_or(DEFAULT_DURATION_MINUTES)),
            ),
            ("message", FieldValue::from(non_empty(self.message))),
            ("status", FieldValue::from(BookingStatus::Pending)),
        ])
    }
}

/// Status-side changes written by the scheduler
#[derive(Debug, Clone, Default)]
pub struct ServiceBookingPatch {
    pub status: Option<BookingStatus>,
    pub confirmed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
}

impl PatchRecord for ServiceBookingPatch {
    type Entity = ServiceBooking;

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "status", self.status);
        set_if_some(&mut fields, "confirmed_at", self.confirmed_at);
        set_if_some(&mut fields, "cancelled_at", self.cancelled_at);
        set_if_some(&mut fields, "cancellation_reason", self.cancellation_reason);
        set_if_some(&mut fields, "meeting_link", self.meeting_link);
        set_if_some(&mut fields, "notes", self.notes);
        Ok(fields)
    }
}
