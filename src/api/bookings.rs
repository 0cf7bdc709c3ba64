use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::StaffPrincipal;
use super::error::ApiError;
use super::extract::{JsonBody, QueryParams};
use crate::db::{BookingStatus, NewServiceBooking, Pagination, ServiceBooking};
use crate::scheduler::{BookingFilter, DayAvailability, StatusChange};
use crate::AppState;

/// Envelope shared by every booking route
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<ServiceBooking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookings: Option<Vec<ServiceBooking>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl BookingResponse {
    fn one(booking: ServiceBooking) -> Json<Self> {
        Json(Self {
            success: true,
            booking: Some(booking),
            bookings: None,
            pagination: None,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub success: bool,
    #[serde(flatten)]
    pub availability: DayAvailability,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: BookingStatus,
    #[serde(flatten)]
    pub change: StatusChange,
}

/// Public booking submission
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<NewServiceBooking>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let booking = state.scheduler.submit(request).await?;
    Ok((StatusCode::CREATED, BookingResponse::one(booking)))
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let date = query
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::validation_field("date", "Date is required"))?;

    let availability = state.scheduler.availability(&date).await?;
    Ok(Json(AvailabilityResponse {
        success: true,
        availability,
    }))
}

/// Public cancellation by booking id. The body is optional.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<JsonBody<CancelRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let reason = body.and_then(|JsonBody(b)| b.reason);
    let booking = state.scheduler.cancel(&id, reason).await?;
    Ok(BookingResponse::one(booking))
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    QueryParams(filter): QueryParams<BookingFilter>,
) -> Result<Json<BookingResponse>, ApiError> {
    let page = state.scheduler.list(filter).await?;
    Ok(Json(BookingResponse {
        success: true,
        booking: None,
        bookings: Some(page.items),
        pagination: Some(page.pagination),
    }))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state.scheduler.get(&id).await?;
    Ok(BookingResponse::one(booking))
}

pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<StatusRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state
        .scheduler
        .update_status(&principal, &id, request.status, request.change)
        .await?;
    Ok(BookingResponse::one(booking))
}
