//! Project, milestone and file endpoints for both portals.
//!
//! Staff manage everything. A client principal only reaches projects whose
//! `client_id` is its own id; every handler checks that per resource.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{AnyPrincipal, ClientPrincipal, StaffPrincipal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{JsonBody, QueryParams};
use super::{ApiResponse, ListParams, ListResponse};
use crate::auth::{ensure_owner, Principal};
use crate::db::{
    Client, ListQuery, Milestone, MilestonePatch, NewMilestone, NewProject, NewProjectFile,
    Project, ProjectFile, ProjectFileUpload, ProjectPatch, ProjectStatus, SortOrder, UploaderKind,
};
use crate::db::store::MAX_LIMIT;
use crate::AppState;

/// Validate a project title
fn validate_project_title(title: &str) -> Result<(), String> {
    if title.trim().len() > 200 {
        return Err("Project title is too long (max 200 characters)".to_string());
    }
    Ok(())
}

/// Validate a project description
fn validate_project_description(description: &Option<String>) -> Result<(), String> {
    if let Some(d) = description {
        if d.len() > 5000 {
            return Err("Project description is too long (max 5000 characters)".to_string());
        }
    }
    Ok(())
}

fn validate_project_text(title: Option<&str>, description: &Option<String>) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(title) = title {
        errors.check("title", validate_project_title(title));
    }
    errors.check("description", validate_project_description(description));
    errors.finish()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListParams {
    pub client_id: Option<String>,
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl ProjectListParams {
    fn into_query(self) -> ListQuery {
        let mut query = ListParams {
            search: self.search,
            page: self.page,
            limit: self.limit,
            sort: self.sort,
            order: self.order,
        }
        .into_query();
        if let Some(client_id) = self.client_id.filter(|c| !c.is_empty()) {
            query = query.eq("client_id", client_id);
        }
        if let Some(status) = self.status {
            query = query.eq("status", status);
        }
        query
    }
}

async fn load_project(state: &AppState, id: &str) -> Result<Project, ApiError> {
    state
        .store::<Project>()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Load a project and check the principal may see it
async fn load_owned_project(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<Project, ApiError> {
    let project = load_project(state, id).await?;
    ensure_owner(principal, &project.client_id)?;
    Ok(project)
}

async fn ensure_client_exists(state: &AppState, client_id: &str) -> Result<(), ApiError> {
    if state.store::<Client>().get_by_id(client_id).await?.is_none() {
        return Err(ApiError::validation_field("clientId", "Client does not exist"));
    }
    Ok(())
}

// -------------------------------------------------------------------------
// Projects
// -------------------------------------------------------------------------

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    QueryParams(params): QueryParams<ProjectListParams>,
) -> Result<Json<ListResponse<Project>>, ApiError> {
    let page = state.store::<Project>().list(&params.into_query()).await?;
    Ok(ListResponse::from_page(page))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    JsonBody(request): JsonBody<NewProject>,
) -> Result<(StatusCode, Json<ApiResponse<Project>>), ApiError> {
    validate_project_text(Some(&request.title), &request.description)?;
    if !request.client_id.trim().is_empty() {
        ensure_client_exists(&state, request.client_id.trim()).await?;
    }

    let project = state.store::<Project>().create(request).await?;
    tracing::info!(
        project_id = %project.id,
        client_id = %project.client_id,
        by = %principal.subject_id,
        "Project created"
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(project)))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<ProjectPatch>,
) -> Result<Json<ApiResponse<Project>>, ApiError> {
    validate_project_text(patch.title.as_deref(), &patch.description)?;
    if let Some(client_id) = patch.client_id.as_deref().filter(|c| !c.trim().is_empty()) {
        ensure_client_exists(&state, client_id.trim()).await?;
    }

    if !state.store::<Project>().update(&id, patch).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    Ok(ApiResponse::ok(load_project(&state, &id).await?))
}

/// Milestones and files of the project stay behind
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store::<Project>().delete(&id).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    tracing::info!(project_id = %id, by = %principal.subject_id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Projects owned by the calling client
pub async fn list_client_projects(
    State(state): State<Arc<AppState>>,
    ClientPrincipal(principal): ClientPrincipal,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<Project>>, ApiError> {
    let query = params.into_query().eq("client_id", principal.subject_id);
    let page = state.store::<Project>().list(&query).await?;
    Ok(ListResponse::from_page(page))
}

/// Shared by both portals
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Project>>, ApiError> {
    let project = load_owned_project(&state, &principal, &id).await?;
    Ok(ApiResponse::ok(project))
}

// -------------------------------------------------------------------------
// Milestones
// -------------------------------------------------------------------------

/// Earliest due date first
pub async fn list_milestones(
    State(state): State<Arc<AppState>>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(project_id): Path<String>,
) -> Result<Json<ListResponse<Milestone>>, ApiError> {
    load_owned_project(&state, &principal, &project_id).await?;

    let query = ListQuery::new()
        .eq("project_id", project_id)
        .sort_by(Some("due_date".to_string()), Some(SortOrder::Asc))
        .paginate(Some(1), Some(MAX_LIMIT));
    let page = state.store::<Milestone>().list(&query).await?;
    Ok(ListResponse::from_page(page))
}

pub async fn create_milestone(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(project_id): Path<String>,
    JsonBody(mut request): JsonBody<NewMilestone>,
) -> Result<(StatusCode, Json<ApiResponse<Milestone>>), ApiError> {
    load_project(&state, &project_id).await?;
    request.project_id = project_id;

    let milestone = state.store::<Milestone>().create(request).await?;
    tracing::info!(
        milestone_id = %milestone.id,
        project_id = %milestone.project_id,
        "Milestone created"
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(milestone)))
}

pub async fn update_milestone(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<MilestonePatch>,
) -> Result<Json<ApiResponse<Milestone>>, ApiError> {
    let store = state.store::<Milestone>();
    if !store.update(&id, patch).await? {
        return Err(ApiError::not_found("Milestone not found"));
    }
    let milestone = store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Milestone not found"))?;
    Ok(ApiResponse::ok(milestone))
}

pub async fn delete_milestone(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store::<Milestone>().delete(&id).await? {
        return Err(ApiError::not_found("Milestone not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// -------------------------------------------------------------------------
// Files
// -------------------------------------------------------------------------

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(project_id): Path<String>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<ProjectFile>>, ApiError> {
    load_owned_project(&state, &principal, &project_id).await?;

    let query = params.into_query().eq("project_id", project_id);
    let page = state.store::<ProjectFile>().list(&query).await?;
    Ok(ListResponse::from_page(page))
}

/// Record metadata for a file already placed in blob storage
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(project_id): Path<String>,
    JsonBody(upload): JsonBody<ProjectFileUpload>,
) -> Result<(StatusCode, Json<ApiResponse<ProjectFile>>), ApiError> {
    load_owned_project(&state, &principal, &project_id).await?;

    let uploaded_by = if principal.is_staff() {
        UploaderKind::Admin
    } else {
        UploaderKind::Client
    };

    let file = state
        .store::<ProjectFile>()
        .create(NewProjectFile {
            project_id,
            upload,
            uploaded_by,
            uploaded_by_id: principal.subject_id.clone(),
        })
        .await?;

    tracing::info!(
        file_id = %file.id,
        project_id = %file.project_id,
        uploaded_by = %file.uploaded_by,
        size = file.file_size,
        "File recorded"
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(file)))
}

/// Staff delete any file; a client only its own uploads on its own projects
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = state.store::<ProjectFile>();
    let file = store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    if !principal.is_staff() {
        load_owned_project(&state, &principal, &file.project_id).await?;
        if file.uploaded_by != UploaderKind::Client {
            return Err(ApiError::forbidden("Only staff can delete staff uploads"));
        }
        ensure_owner(&principal, &file.uploaded_by_id)?;
    }

    store.delete(&id).await?;
    tracing::info!(file_id = %id, by = %principal.subject_id, "File deleted");
    Ok(StatusCode::NO_CONTENT)
}
