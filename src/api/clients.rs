use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::StaffPrincipal;
use super::error::ApiError;
use super::extract::{JsonBody, QueryParams};
use super::{ApiResponse, ListParams, ListResponse};
use crate::db::{Client, ClientPatch, Filter, NewClient, Project};
use crate::AppState;

pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<Client>>, ApiError> {
    let page = state.store::<Client>().list(&params.into_query()).await?;
    Ok(ListResponse::from_page(page))
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    JsonBody(request): JsonBody<NewClient>,
) -> Result<(StatusCode, Json<ApiResponse<Client>>), ApiError> {
    let client = state.store::<Client>().create(request).await?;
    tracing::info!(client_id = %client.id, by = %principal.subject_id, "Client created");
    Ok((StatusCode::CREATED, ApiResponse::ok(client)))
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Client>>, ApiError> {
    let client = state
        .store::<Client>()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;
    Ok(ApiResponse::ok(client))
}

pub async fn update_client(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<ClientPatch>,
) -> Result<Json<ApiResponse<Client>>, ApiError> {
    let store = state.store::<Client>();
    if !store.update(&id, patch).await? {
        return Err(ApiError::not_found("Client not found"));
    }
    let client = store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;
    Ok(ApiResponse::ok(client))
}

/// Hard delete. Projects owned by the client are left in place.
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store::<Client>().delete(&id).await? {
        return Err(ApiError::not_found("Client not found"));
    }

    let orphaned = state
        .store::<Project>()
        .count(&[Filter::Eq("client_id", id.clone().into())])
        .await?;
    if orphaned > 0 {
        tracing::warn!(
            client_id = %id,
            orphaned_projects = orphaned,
            "Deleted client still owns projects"
        );
    }

    tracing::info!(client_id = %id, by = %principal.subject_id, "Client deleted");
    Ok(StatusCode::NO_CONTENT)
}
