//! Booking scheduler.
//!
//! Owns the booking lifecycle: validating a requested slot, rejecting past
//! and occupied slots, moving bookings through
//! `pending -> confirmed -> cancelled` and firing best-effort notifications.
//! A slot is the `(booking_date, preferred_time)` pair and the calendar is
//! global across services.

mod store;

pub use store::{BookingStore, BookingWrite};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::{ensure_staff, Principal};
use crate::config::BookingConfig;
use crate::db::{
    BookingStatus, Filter, ListQuery, NewServiceBooking, NewRecord, Page, ServiceBooking,
    ServiceBookingPatch, SortOrder,
};
use crate::error::{CoreError, CoreResult};
use crate::notifications::{BookingEmail, Notifier};
use crate::validation::{check, parse_iso_date, validate_url};

/// Source of "now"; swapped for a fixed instant in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Extra fields carried by a status change
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
}

/// Staff listing filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingFilter {
    pub client_email: Option<String>,
    pub status: Option<BookingStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl BookingFilter {
    fn into_query(self) -> ListQuery {
        let mut query = ListQuery::new()
            .search(self.search)
            .paginate(self.page, self.limit)
            .sort_by(self.sort, self.order);
        if let Some(email) = self.client_email.filter(|e| !e.trim().is_empty()) {
            query = query.filter(Filter::EqIgnoreCase("client_email", email.trim().to_string()));
        }
        if let Some(status) = self.status {
            query = query.eq("status", status);
        }
        query
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotAvailability {
    pub time: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: String,
    pub timezone: String,
    pub slots: Vec<SlotAvailability>,
}

/// Parse a time-of-day such as `"10:00 AM"`, `"9:30 pm"` or `"14:00"`
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim().to_uppercase();
    let padded = if trimmed.find(':') == Some(1) {
        format!("0{}", trimmed)
    } else {
        trimmed
    };

    ["%I:%M %p", "%I:%M%p", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&padded, format).ok())
}

/// A slot is past when its date is before today (UTC), or it is today and a
/// parseable time has already passed. Unparseable times on today's date are
/// accepted.
pub fn is_past_slot(date: NaiveDate, preferred_time: &str, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    if date < today {
        return true;
    }
    if date > today {
        return false;
    }
    parse_time_of_day(preferred_time)
        .map(|time| time <= now.time())
        .unwrap_or(false)
}

/// Guarded writes per status change. Statuses only move forward, so a
/// booking can go stale at most twice.
const MAX_WRITE_ATTEMPTS: usize = 3;

fn booking_not_found() -> CoreError {
    CoreError::NotFound("Booking not found".to_string())
}

fn booking_contended(id: &str) -> CoreError {
    warn!(booking_id = %id, "Giving up on a booking that keeps changing");
    CoreError::Conflict("Booking was modified concurrently, try again".to_string())
}

pub struct BookingScheduler {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    config: BookingConfig,
    email_timeout: Duration,
    clock: Clock,
}

impl BookingScheduler {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        config: BookingConfig,
        email_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            email_timeout,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Validate and persist a new booking in `pending`, then notify the
    /// client and the agency in the background.
    pub async fn submit(&self, mut request: NewServiceBooking) -> CoreResult<ServiceBooking> {
        request.validate()?;

        let date = parse_iso_date(request.booking_date.trim())
            .map_err(|message| CoreError::validation("bookingDate", message))?;
        if is_past_slot(date, &request.preferred_time, self.now()) {
            return Err(CoreError::PastDate);
        }

        let booking_date = request.booking_date.trim().to_string();
        let preferred_time = request.preferred_time.trim().to_string();

        if self
            .store
            .check_conflicting_booking(&booking_date, &preferred_time)
            .await?
            .is_some()
        {
            return Err(CoreError::SlotConflict {
                date: booking_date,
                time: preferred_time,
            });
        }

        if request.timezone.as_deref().map_or(true, |tz| tz.trim().is_empty()) {
            request.timezone = Some(self.config.default_timezone.clone());
        }
        if request.duration.is_none() {
            request.duration = Some(self.config.default_duration_minutes);
        }

        let booking = self.store.create_service_booking(request).await?;

        info!(
            booking_id = %booking.id,
            service = %booking.service_name,
            date = %booking.booking_date,
            time = %booking.preferred_time,
            "Booking submitted"
        );

        self.notify_submitted(&booking);
        Ok(booking)
    }

    /// Two independent fire-and-forget sends; one failing never affects the
    /// other or the booking.
    fn notify_submitted(&self, booking: &ServiceBooking) {
        let email = BookingEmail::from(booking);

        let notifier = self.notifier.clone();
        let client_email = email.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_booking_confirmation_email(&client_email)
                .await
            {
                warn!(
                    booking_id = %client_email.booking_id,
                    error = %e,
                    "Failed to send booking confirmation to client"
                );
            }
        });

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_service_booking_email(&email).await {
                warn!(
                    booking_id = %email.booking_id,
                    error = %e,
                    "Failed to send booking notice to admin"
                );
            }
        });
    }

    pub async fn get(&self, id: &str) -> CoreResult<ServiceBooking> {
        self.store
            .get_service_booking_by_id(id)
            .await?
            .ok_or_else(booking_not_found)
    }

    /// Staff-only status change. The write only lands while the booking is
    /// still in the status the decision was made on; otherwise the decision
    /// is retaken against the fresh row.
    pub async fn update_status(
        &self,
        principal: &Principal,
        id: &str,
        new_status: BookingStatus,
        change: StatusChange,
    ) -> CoreResult<ServiceBooking> {
        ensure_staff(principal)?;
        check("meetingLink", validate_url(&change.meeting_link))?;

        let mut booking = self.get(id).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let current = booking.status;
            let patch = match self.plan_status_change(&booking, new_status, &change)? {
                Some(patch) => patch,
                None => return Ok(booking),
            };

            match self.store.update_service_booking(id, current, patch).await? {
                BookingWrite::Applied(updated) => {
                    if updated.status != current {
                        info!(
                            booking_id = %updated.id,
                            from = %current,
                            to = %updated.status,
                            by = %principal.subject_id,
                            "Booking status changed"
                        );
                        if updated.status == BookingStatus::Confirmed {
                            self.send_confirmation(&updated).await;
                        }
                    }
                    return Ok(updated);
                }
                BookingWrite::Stale(fresh) => {
                    warn!(
                        booking_id = %id,
                        expected = %current,
                        found = %fresh.status,
                        "Booking changed during status update"
                    );
                    booking = fresh;
                }
                BookingWrite::Missing => return Err(booking_not_found()),
            }
        }

        Err(booking_contended(id))
    }

    /// The patch moving `booking` to `new_status`, or `None` when the booking
    /// is already there and nothing changes
    fn plan_status_change(
        &self,
        booking: &ServiceBooking,
        new_status: BookingStatus,
        change: &StatusChange,
    ) -> CoreResult<Option<ServiceBookingPatch>> {
        let now = self.now().to_rfc3339();

        let patch = match (booking.status, new_status) {
            (BookingStatus::Cancelled, BookingStatus::Cancelled) => return Ok(None),
            (BookingStatus::Confirmed, BookingStatus::Confirmed) => {
                if change.meeting_link.is_none() && change.notes.is_none() {
                    return Ok(None);
                }
                ServiceBookingPatch {
                    meeting_link: change.meeting_link.clone(),
                    notes: change.notes.clone(),
                    ..Default::default()
                }
            }
            (from, to) if !from.can_transition_to(to) => {
                return Err(CoreError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            // Only confirmed and cancelled are reachable past the transition check
            (_, BookingStatus::Confirmed) => ServiceBookingPatch {
                status: Some(BookingStatus::Confirmed),
                confirmed_at: Some(now),
                meeting_link: change.meeting_link.clone(),
                notes: change.notes.clone(),
                ..Default::default()
            },
            _ => ServiceBookingPatch {
                status: Some(BookingStatus::Cancelled),
                cancelled_at: Some(now),
                cancellation_reason: change.cancellation_reason.clone(),
                notes: change.notes.clone(),
                ..Default::default()
            },
        };

        Ok(Some(patch))
    }

    /// Public cancellation by id. Cancelling twice returns the booking as is.
    pub async fn cancel(&self, id: &str, reason: Option<String>) -> CoreResult<ServiceBooking> {
        let mut booking = self.get(id).await?;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            if booking.status == BookingStatus::Cancelled {
                return Ok(booking);
            }

            let patch = ServiceBookingPatch {
                status: Some(BookingStatus::Cancelled),
                cancelled_at: Some(self.now().to_rfc3339()),
                cancellation_reason: reason.clone(),
                ..Default::default()
            };

            match self
                .store
                .update_service_booking(id, booking.status, patch)
                .await?
            {
                BookingWrite::Applied(updated) => {
                    info!(booking_id = %updated.id, "Booking cancelled by id");
                    return Ok(updated);
                }
                BookingWrite::Stale(fresh) => booking = fresh,
                BookingWrite::Missing => return Err(booking_not_found()),
            }
        }

        Err(booking_contended(id))
    }

    pub async fn list(&self, filter: BookingFilter) -> CoreResult<Page<ServiceBooking>> {
        self.store.get_service_bookings(&filter.into_query()).await
    }

    /// Configured daily slots for `date`, each marked free or taken
    pub async fn availability(&self, date: &str) -> CoreResult<DayAvailability> {
        let parsed = parse_iso_date(date.trim())
            .map_err(|message| CoreError::validation("date", message))?;
        let now = self.now();
        if parsed < now.date_naive() {
            return Err(CoreError::PastDate);
        }

        let taken = self.store.booked_times(date.trim()).await?;

        let slots = self
            .config
            .daily_slots
            .iter()
            .map(|time| SlotAvailability {
                time: time.clone(),
                available: !taken.iter().any(|t| t == time) && !is_past_slot(parsed, time, now),
            })
            .collect();

        Ok(DayAvailability {
            date: date.trim().to_string(),
            timezone: self.config.default_timezone.clone(),
            slots,
        })
    }

    /// Awaited but bounded; failures and timeouts are only logged
    async fn send_confirmation(&self, booking: &ServiceBooking) {
        let email = BookingEmail::from(booking);
        match tokio::time::timeout(
            self.email_timeout,
            self.notifier.send_booking_confirmation_email(&email),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                booking_id = %booking.id,
                error = %e,
                "Failed to send confirmation email"
            ),
            Err(_) => warn!(
                booking_id = %booking.id,
                timeout_secs = self.email_timeout.as_secs(),
                "Confirmation email timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::{init_in_memory, EntityStore};
    use crate::notifications::ContactEmail;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingNotifier {
        confirmations: AtomicUsize,
        admin_notices: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_booking_confirmation_email(&self, _: &BookingEmail) -> anyhow::Result<()> {
            self.confirmations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("smtp down");
            }
            Ok(())
        }

        async fn send_service_booking_email(&self, _: &BookingEmail) -> anyhow::Result<()> {
            self.admin_notices.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("smtp down");
            }
            Ok(())
        }

        async fn send_contact_email(&self, _: &ContactEmail) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn fixed_clock(y: i32, m: u32, d: u32, h: u32, min: u32) -> Clock {
        let instant = Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap();
        Arc::new(move || instant)
    }

    async fn scheduler_with(notifier: Arc<RecordingNotifier>) -> BookingScheduler {
        let pool = init_in_memory().await.unwrap();
        let store: Arc<dyn BookingStore> = Arc::new(EntityStore::<ServiceBooking>::new(pool));
        BookingScheduler::new(
            store,
            notifier,
            BookingConfig::default(),
            Duration::from_secs(1),
        )
        .with_clock(fixed_clock(2025, 5, 20, 12, 0))
    }

    /// Serves a frozen copy of one booking to reads, as a request that
    /// loaded it earlier would see it. Writes go to the real store.
    struct FrozenReadStore {
        inner: EntityStore<ServiceBooking>,
        frozen: std::sync::Mutex<Option<ServiceBooking>>,
    }

    impl FrozenReadStore {
        fn freeze(&self, booking: ServiceBooking) {
            *self.frozen.lock().unwrap() = Some(booking);
        }
    }

    #[async_trait]
    impl BookingStore for FrozenReadStore {
        async fn get_service_booking_by_id(&self, id: &str) -> CoreResult<Option<ServiceBooking>> {
            let frozen = self.frozen.lock().unwrap().clone();
            match frozen {
                Some(booking) if booking.id == id => Ok(Some(booking)),
                _ => self.inner.get_service_booking_by_id(id).await,
            }
        }

        async fn check_conflicting_booking(
            &self,
            booking_date: &str,
            preferred_time: &str,
        ) -> CoreResult<Option<ServiceBooking>> {
            self.inner
                .check_conflicting_booking(booking_date, preferred_time)
                .await
        }

        async fn create_service_booking(
            &self,
            booking: NewServiceBooking,
        ) -> CoreResult<ServiceBooking> {
            self.inner.create_service_booking(booking).await
        }

        async fn update_service_booking(
            &self,
            id: &str,
            expected: BookingStatus,
            patch: ServiceBookingPatch,
        ) -> CoreResult<BookingWrite> {
            self.inner.update_service_booking(id, expected, patch).await
        }

        async fn get_service_bookings(
            &self,
            query: &ListQuery,
        ) -> CoreResult<Page<ServiceBooking>> {
            self.inner.get_service_bookings(query).await
        }

        async fn booked_times(&self, booking_date: &str) -> CoreResult<Vec<String>> {
            self.inner.booked_times(booking_date).await
        }
    }

    /// A scheduler reading through a frozen snapshot plus one on the live
    /// store, sharing a database
    async fn frozen_and_live() -> (Arc<FrozenReadStore>, BookingScheduler, BookingScheduler) {
        let pool = init_in_memory().await.unwrap();
        let frozen = Arc::new(FrozenReadStore {
            inner: EntityStore::new(pool.clone()),
            frozen: std::sync::Mutex::new(None),
        });
        let build = |store: Arc<dyn BookingStore>| {
            BookingScheduler::new(
                store,
                Arc::new(RecordingNotifier::default()),
                BookingConfig::default(),
                Duration::from_secs(1),
            )
            .with_clock(fixed_clock(2025, 5, 20, 12, 0))
        };
        let stale = build(frozen.clone() as Arc<dyn BookingStore>);
        let live = build(Arc::new(EntityStore::<ServiceBooking>::new(pool)));
        (frozen, stale, live)
    }

    async fn scheduler() -> BookingScheduler {
        scheduler_with(Arc::new(RecordingNotifier::default())).await
    }

    fn staff() -> Principal {
        Principal {
            subject_id: "admin-1".into(),
            role: Role::Founder,
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn request(date: &str, time: &str) -> NewServiceBooking {
        NewServiceBooking {
            service_id: "web".into(),
            service_name: "Web Development".into(),
            client_name: "Ada".into(),
            client_email: "ada@example.com".into(),
            booking_date: date.into(),
            preferred_time: time.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_time_of_day() {
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert_eq!(parse_time_of_day("10:00 AM"), Some(ten));
        assert_eq!(parse_time_of_day("10:00am"), Some(ten));
        assert_eq!(parse_time_of_day("10:00"), Some(ten));
        assert_eq!(
            parse_time_of_day("9:30 PM"),
            NaiveTime::from_hms_opt(21, 30, 0)
        );
        assert_eq!(
            parse_time_of_day("12:00 PM"),
            NaiveTime::from_hms_opt(12, 0, 0)
        );
        assert_eq!(parse_time_of_day("after lunch"), None);
    }

    #[test]
    fn test_is_past_slot() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        assert!(is_past_slot(yesterday, "11:00 PM", now));
        assert!(!is_past_slot(tomorrow, "1:00 AM", now));
        assert!(is_past_slot(today, "10:00 AM", now));
        assert!(is_past_slot(today, "11:00 AM", now));
        assert!(!is_past_slot(today, "2:00 PM", now));
        assert!(!is_past_slot(today, "whenever", now));
    }

    #[tokio::test]
    async fn test_submit_succeeds_pending_with_defaults() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(notifier.clone()).await;

        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.timezone, "UTC");
        assert_eq!(booking.duration, 30);
        assert!(booking.confirmed_at.is_none());

        // Spawned notifications run independently of the response
        for _ in 0..50 {
            if notifier.admin_notices.load(Ordering::SeqCst) == 1
                && notifier.confirmations.load(Ordering::SeqCst) == 1
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.confirmations.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.admin_notices.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_submission() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let scheduler = scheduler_with(notifier).await;
        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await;
        assert!(booking.is_ok());
    }

    #[tokio::test]
    async fn test_past_dates_rejected_regardless_of_other_fields() {
        let scheduler = scheduler().await;
        assert!(matches!(
            scheduler.submit(request("2025-05-19", "10:00 AM")).await,
            Err(CoreError::PastDate)
        ));
        // Same day, earlier time
        assert!(matches!(
            scheduler.submit(request("2025-05-20", "9:00 AM")).await,
            Err(CoreError::PastDate)
        ));
        // Same day, later time is fine
        assert!(scheduler.submit(request("2025-05-20", "4:00 PM")).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_before_anything_else() {
        let scheduler = scheduler().await;
        let mut bad = request("2025-06-01", "10:00 AM");
        bad.client_email = String::new();
        assert!(matches!(
            scheduler.submit(bad).await,
            Err(CoreError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slot_conflicts_across_services() {
        let scheduler = scheduler().await;
        scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();

        let mut other_service = request("2025-06-01", "10:00 AM");
        other_service.service_id = "seo".into();
        other_service.client_email = "grace@example.com".into();
        assert!(matches!(
            scheduler.submit(other_service).await,
            Err(CoreError::SlotConflict { .. })
        ));

        // Different time on the same day is free
        assert!(scheduler.submit(request("2025-06-01", "11:00 AM")).await.is_ok());
    }

    #[tokio::test]
    async fn test_storage_index_rejects_slot_when_precheck_is_bypassed() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<ServiceBooking>::new(pool);
        store.create_service_booking(request("2025-06-01", "10:00 AM")).await.unwrap();

        assert!(matches!(
            store.create_service_booking(request("2025-06-01", "10:00 AM")).await,
            Err(CoreError::SlotConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let scheduler = scheduler().await;
        let first = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        scheduler.cancel(&first.id, None).await.unwrap();
        assert!(scheduler.submit(request("2025-06-01", "10:00 AM")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let scheduler = scheduler().await;
        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();

        let first = scheduler
            .cancel(&booking.id, Some("changed plans".into()))
            .await
            .unwrap();
        assert_eq!(first.status, BookingStatus::Cancelled);
        let stamped = first.cancelled_at.clone();
        assert!(stamped.is_some());

        let second = scheduler
            .cancel(&booking.id, Some("again".into()))
            .await
            .unwrap();
        assert_eq!(second.status, BookingStatus::Cancelled);
        assert_eq!(second.cancelled_at, stamped);
        assert_eq!(second.cancellation_reason.as_deref(), Some("changed plans"));

        assert!(matches!(
            scheduler.cancel("missing", None).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_requires_staff() {
        let scheduler = scheduler().await;
        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        let client = Principal {
            role: Role::Client,
            ..staff()
        };
        assert!(matches!(
            scheduler
                .update_status(&client, &booking.id, BookingStatus::Confirmed, StatusChange::default())
                .await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            scheduler
                .update_status(&staff(), "missing", BookingStatus::Confirmed, StatusChange::default())
                .await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let scheduler = scheduler().await;
        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        scheduler.cancel(&booking.id, None).await.unwrap();

        assert!(matches!(
            scheduler
                .update_status(&staff(), &booking.id, BookingStatus::Confirmed, StatusChange::default())
                .await,
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            scheduler
                .update_status(&staff(), &booking.id, BookingStatus::Pending, StatusChange::default())
                .await,
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_from_stale_read_cannot_revive_cancelled_booking() {
        let (frozen, stale, live) = frozen_and_live().await;
        let booking = live.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        frozen.freeze(booking.clone());

        live.cancel(&booking.id, Some("gone".into())).await.unwrap();

        assert!(matches!(
            stale
                .update_status(&staff(), &booking.id, BookingStatus::Confirmed, StatusChange::default())
                .await,
            Err(CoreError::InvalidTransition { .. })
        ));
        let stored = live.get(&booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(stored.confirmed_at.is_none());

        // The freed slot is taken again; the stale confirm still reports the
        // transition, not a uniqueness clash
        live.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        assert!(matches!(
            stale
                .update_status(&staff(), &booking.id, BookingStatus::Confirmed, StatusChange::default())
                .await,
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_from_stale_read_keeps_first_cancellation() {
        let (frozen, stale, live) = frozen_and_live().await;
        let booking = live.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        frozen.freeze(booking.clone());

        let first = live.cancel(&booking.id, Some("first".into())).await.unwrap();
        let second = stale.cancel(&booking.id, Some("second".into())).await.unwrap();

        assert_eq!(second.status, BookingStatus::Cancelled);
        assert_eq!(second.cancelled_at, first.cancelled_at);
        assert_eq!(second.cancellation_reason.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cancel_from_stale_read_still_cancels_confirmed_booking() {
        let (frozen, stale, live) = frozen_and_live().await;
        let booking = live.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        frozen.freeze(booking.clone());

        live.update_status(&staff(), &booking.id, BookingStatus::Confirmed, StatusChange::default())
            .await
            .unwrap();

        let cancelled = stale.cancel(&booking.id, Some("late".into())).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.confirmed_at.is_some());
        assert_eq!(live.get(&booking.id).await.unwrap().status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_guarded_write_reports_stale_and_missing_rows() {
        let pool = init_in_memory().await.unwrap();
        let store = EntityStore::<ServiceBooking>::new(pool);
        let booking = store
            .create_service_booking(request("2025-06-01", "10:00 AM"))
            .await
            .unwrap();

        let patch = || ServiceBookingPatch {
            status: Some(BookingStatus::Cancelled),
            ..Default::default()
        };
        assert!(matches!(
            store
                .update_service_booking(&booking.id, BookingStatus::Confirmed, patch())
                .await
                .unwrap(),
            BookingWrite::Stale(current) if current.status == BookingStatus::Pending
        ));
        assert!(matches!(
            store
                .update_service_booking(&booking.id, BookingStatus::Pending, patch())
                .await
                .unwrap(),
            BookingWrite::Applied(updated) if updated.status == BookingStatus::Cancelled
        ));
        assert!(matches!(
            store
                .update_service_booking("missing", BookingStatus::Pending, patch())
                .await
                .unwrap(),
            BookingWrite::Missing
        ));
    }

    #[tokio::test]
    async fn test_reconfirm_updates_link_without_restamp_or_email() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(notifier.clone()).await;
        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();

        let confirmed = scheduler
            .update_status(
                &staff(),
                &booking.id,
                BookingStatus::Confirmed,
                StatusChange {
                    meeting_link: Some("https://meet.example.com/a".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let sent = notifier.confirmations.load(Ordering::SeqCst);

        let again = scheduler
            .update_status(
                &staff(),
                &booking.id,
                BookingStatus::Confirmed,
                StatusChange {
                    meeting_link: Some("https://meet.example.com/b".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(again.confirmed_at, confirmed.confirmed_at);
        assert_eq!(again.meeting_link.as_deref(), Some("https://meet.example.com/b"));
        assert_eq!(notifier.confirmations.load(Ordering::SeqCst), sent);
    }

    #[tokio::test]
    async fn test_end_to_end_booking_scenario() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = scheduler_with(notifier.clone()).await;

        let booking = scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);

        assert!(matches!(
            scheduler.submit(request("2025-06-01", "10:00 AM")).await,
            Err(CoreError::SlotConflict { .. })
        ));

        let confirmed = scheduler
            .update_status(
                &staff(),
                &booking.id,
                BookingStatus::Confirmed,
                StatusChange {
                    meeting_link: Some("https://x".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());
        assert_eq!(confirmed.meeting_link.as_deref(), Some("https://x"));

        let cancelled = scheduler
            .cancel(&booking.id, Some("client unavailable".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(
            cancelled.cancellation_reason.as_deref(),
            Some("client unavailable")
        );
    }

    #[tokio::test]
    async fn test_list_by_email_is_case_insensitive_newest_first() {
        let scheduler = scheduler().await;
        let mut first = request("2025-06-01", "10:00 AM");
        first.client_email = "A@B.com".into();
        let first = scheduler.submit(first).await.unwrap();

        let mut other = request("2025-06-01", "11:00 AM");
        other.client_email = "someone@else.com".into();
        scheduler.submit(other).await.unwrap();

        let mut second = request("2025-06-02", "10:00 AM");
        second.client_email = "a@b.com".into();
        let second = scheduler.submit(second).await.unwrap();

        let page = scheduler
            .list(BookingFilter {
                client_email: Some("a@b.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|b| b.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(page.pagination.total, 2);

        let pending = scheduler
            .list(BookingFilter {
                status: Some(BookingStatus::Confirmed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_availability_sees_bookings_beyond_one_page() {
        let scheduler = scheduler().await;
        scheduler.submit(request("2025-06-01", "3:00 PM")).await.unwrap();
        // Newer live bookings on the same day than a list page holds
        for minute in 0..(crate::db::store::MAX_LIMIT + 5) {
            let time = format!("{}:{:02}", 6 + minute / 60, minute % 60);
            let mut booking = request("2025-06-01", &time);
            booking.client_email = format!("c{}@example.com", minute);
            scheduler.submit(booking).await.unwrap();
        }

        let day = scheduler.availability("2025-06-01").await.unwrap();
        let three = day.slots.iter().find(|s| s.time == "3:00 PM").unwrap();
        assert!(!three.available);
    }

    #[tokio::test]
    async fn test_availability_marks_taken_and_past_slots() {
        let scheduler = scheduler().await;
        scheduler.submit(request("2025-06-01", "10:00 AM")).await.unwrap();
        let cancelled = scheduler.submit(request("2025-06-01", "2:00 PM")).await.unwrap();
        scheduler.cancel(&cancelled.id, None).await.unwrap();

        let day = scheduler.availability("2025-06-01").await.unwrap();
        let ten = day.slots.iter().find(|s| s.time == "10:00 AM").unwrap();
        let two = day.slots.iter().find(|s| s.time == "2:00 PM").unwrap();
        assert!(!ten.available);
        assert!(two.available);

        // Clock is 2025-05-20 12:00 UTC
        let today = scheduler.availability("2025-05-20").await.unwrap();
        assert!(!today.slots.iter().find(|s| s.time == "9:00 AM").unwrap().available);
        assert!(today.slots.iter().find(|s| s.time == "3:00 PM").unwrap().available);

        assert!(matches!(
            scheduler.availability("2025-05-01").await,
            Err(CoreError::PastDate)
        ));
        assert!(matches!(
            scheduler.availability("tomorrow").await,
            Err(CoreError::Validation { .. })
        ));
    }
}
