//! Persistence seam used by the scheduler.

use async_trait::async_trait;

use crate::db::{
    BookingStatus, EntityStore, Filter, ListQuery, NewServiceBooking, Page, ServiceBooking,
    ServiceBookingPatch,
};
use crate::error::{CoreError, CoreResult};

/// Outcome of a status-guarded booking write
#[derive(Debug, Clone)]
pub enum BookingWrite {
    /// The patch was applied; holds the stored result
    Applied(ServiceBooking),
    /// The booking left the expected status first; holds its current state
    Stale(ServiceBooking),
    Missing,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_service_booking_by_id(&self, id: &str) -> CoreResult<Option<ServiceBooking>>;

    /// The live (non-cancelled) booking holding a slot, if any
    async fn check_conflicting_booking(
        &self,
        booking_date: &str,
        preferred_time: &str,
    ) -> CoreResult<Option<ServiceBooking>>;

    /// Insert a pending booking. A concurrent insert for the same slot loses
    /// with `SlotConflict`.
    async fn create_service_booking(&self, booking: NewServiceBooking)
        -> CoreResult<ServiceBooking>;

    /// Apply a patch only while the booking is still in `expected`
    async fn update_service_booking(
        &self,
        id: &str,
        expected: BookingStatus,
        patch: ServiceBookingPatch,
    ) -> CoreResult<BookingWrite>;

    async fn get_service_bookings(&self, query: &ListQuery) -> CoreResult<Page<ServiceBooking>>;

    /// Preferred times held by live bookings on `booking_date`
    async fn booked_times(&self, booking_date: &str) -> CoreResult<Vec<String>>;
}

#[async_trait]
impl BookingStore for EntityStore<ServiceBooking> {
    async fn get_service_booking_by_id(&self, id: &str) -> CoreResult<Option<ServiceBooking>> {
        self.get_by_id(id).await
    }

    async fn check_conflicting_booking(
        &self,
        booking_date: &str,
        preferred_time: &str,
    ) -> CoreResult<Option<ServiceBooking>> {
        let booking = sqlx::query_as::<_, ServiceBooking>(
            "SELECT * FROM service_bookings \
             WHERE booking_date = ? AND preferred_time = ? AND status != 'cancelled' \
             LIMIT 1",
        )
        .bind(booking_date)
        .bind(preferred_time)
        .fetch_optional(self.pool())
        .await?;
        Ok(booking)
    }

    async fn create_service_booking(
        &self,
        booking: NewServiceBooking,
    ) -> CoreResult<ServiceBooking> {
        let date = booking.booking_date.trim().to_string();
        let time = booking.preferred_time.trim().to_string();

        match self.create(booking).await {
            Err(CoreError::Conflict(_)) => {
                tracing::warn!(date = %date, time = %time, "Slot taken by a concurrent booking");
                Err(CoreError::SlotConflict { date, time })
            }
            other => other,
        }
    }

    async fn update_service_booking(
        &self,
        id: &str,
        expected: BookingStatus,
        patch: ServiceBookingPatch,
    ) -> CoreResult<BookingWrite> {
        let applied = self
            .update_if(id, &[Filter::Eq("status", expected.into())], patch)
            .await?;

        Ok(match (applied, self.get_by_id(id).await?) {
            (_, None) => BookingWrite::Missing,
            (true, Some(booking)) => BookingWrite::Applied(booking),
            (false, Some(booking)) => BookingWrite::Stale(booking),
        })
    }

    async fn get_service_bookings(&self, query: &ListQuery) -> CoreResult<Page<ServiceBooking>> {
        self.list(query).await
    }

    async fn booked_times(&self, booking_date: &str) -> CoreResult<Vec<String>> {
        let times = sqlx::query_scalar::<_, String>(
            "SELECT preferred_time FROM service_bookings \
             WHERE booking_date = ? AND status != 'cancelled'",
        )
        .bind(booking_date)
        .fetch_all(self.pool())
        .await?;
        Ok(times)
    }
}
