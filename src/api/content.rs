//! Public site content.
//!
//! Every kind shares the same handlers: public reads that only see
//! published (or approved) rows, and staff CRUD under `/api/admin/<kind>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use super::auth::StaffPrincipal;
use super::error::ApiError;
use super::extract::{JsonBody, QueryParams};
use super::{ApiResponse, ListParams, ListResponse};
use crate::db::{
    Blog, BlogPatch, BlogReview, BlogReviewPatch, Book, BookPatch, Category, CategoryPatch,
    Entity, Faq, FaqPatch, ListQuery, NewBlog, NewBlogReview, NewBook, NewCategory, NewFaq,
    NewRecord, NewTag, NewTestimonial, PatchRecord, Tag, TagPatch, Testimonial,
    TestimonialPatch,
};
use crate::AppState;

/// A content kind exposed through the generic handlers
pub trait ContentKind: Entity + Serialize + Sync {
    type New: NewRecord<Entity = Self> + DeserializeOwned + 'static;
    type Patch: PatchRecord<Entity = Self> + DeserializeOwned + 'static;
}

macro_rules! content_kind {
    ($($entity:ty => $new:ty, $patch:ty;)*) => {
        $(
            impl ContentKind for $entity {
                type New = $new;
                type Patch = $patch;
            }
        )*
    };
}

content_kind! {
    Blog => NewBlog, BlogPatch;
    BlogReview => NewBlogReview, BlogReviewPatch;
    Book => NewBook, BookPatch;
    Testimonial => NewTestimonial, TestimonialPatch;
    Faq => NewFaq, FaqPatch;
    Tag => NewTag, TagPatch;
    Category => NewCategory, CategoryPatch;
}

fn not_found<K: Entity>() -> ApiError {
    ApiError::not_found(format!("{} not found", K::KIND))
}

/// Restrict a query to rows visible on the public site
fn published<K: Entity>(query: ListQuery) -> ListQuery {
    match K::PUBLISH_FLAG {
        Some(flag) => query.eq(flag, true),
        None => query,
    }
}

fn is_visible<K: Entity>(flag_value: bool) -> bool {
    K::PUBLISH_FLAG.is_none() || flag_value
}

// -------------------------------------------------------------------------
// Public reads
// -------------------------------------------------------------------------

pub async fn public_list<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<K>>, ApiError> {
    let query = published::<K>(params.into_query());
    let page = state.store::<K>().list(&query).await?;
    Ok(ListResponse::from_page(page))
}

/// Published post by slug. The view counter is bumped on the side and a
/// failure there never fails the read.
pub async fn get_blog(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<Blog>>, ApiError> {
    let store = state.store::<Blog>();
    let mut blog = store
        .get_by_unique_key(&slug)
        .await?
        .filter(|b| is_visible::<Blog>(b.is_published))
        .ok_or_else(not_found::<Blog>)?;

    match store.increment(&blog.id, "view_count").await {
        Ok(()) => blog.view_count += 1,
        Err(e) => tracing::warn!(blog_id = %blog.id, error = %e, "Failed to record blog view"),
    }

    Ok(ApiResponse::ok(blog))
}

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<Book>>, ApiError> {
    let book = state
        .store::<Book>()
        .get_by_unique_key(&slug)
        .await?
        .filter(|b| is_visible::<Book>(b.is_published))
        .ok_or_else(not_found::<Book>)?;
    Ok(ApiResponse::ok(book))
}

async fn published_blog(state: &AppState, slug: &str) -> Result<Blog, ApiError> {
    state
        .store::<Blog>()
        .get_by_unique_key(slug)
        .await?
        .filter(|b| b.is_published)
        .ok_or_else(not_found::<Blog>)
}

/// Approved reviews of a published post
pub async fn list_blog_reviews(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<BlogReview>>, ApiError> {
    let blog = published_blog(&state, &slug).await?;
    let query = published::<BlogReview>(params.into_query()).eq("blog_id", blog.id);
    let page = state.store::<BlogReview>().list(&query).await?;
    Ok(ListResponse::from_page(page))
}

/// Reader review; held for moderation
pub async fn create_blog_review(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    JsonBody(mut request): JsonBody<NewBlogReview>,
) -> Result<(StatusCode, Json<ApiResponse<BlogReview>>), ApiError> {
    let blog = published_blog(&state, &slug).await?;
    request.blog_id = blog.id;

    let review = state.store::<BlogReview>().create(request).await?;
    tracing::info!(review_id = %review.id, blog = %slug, "Review submitted for moderation");
    Ok((StatusCode::CREATED, ApiResponse::ok(review)))
}

// -------------------------------------------------------------------------
// Staff CRUD
// -------------------------------------------------------------------------

pub async fn admin_list<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ListResponse<K>>, ApiError> {
    let page = state.store::<K>().list(&params.into_query()).await?;
    Ok(ListResponse::from_page(page))
}

pub async fn admin_get<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<K>>, ApiError> {
    let item = state
        .store::<K>()
        .get_by_id(&id)
        .await?
        .ok_or_else(not_found::<K>)?;
    Ok(ApiResponse::ok(item))
}

pub async fn admin_create<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    JsonBody(request): JsonBody<K::New>,
) -> Result<(StatusCode, Json<ApiResponse<K>>), ApiError> {
    let item = state.store::<K>().create(request).await?;
    tracing::info!(kind = K::KIND, id = %item.id(), by = %principal.subject_id, "Content created");
    Ok((StatusCode::CREATED, ApiResponse::ok(item)))
}

pub async fn admin_update<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(_): StaffPrincipal,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<K::Patch>,
) -> Result<Json<ApiResponse<K>>, ApiError> {
    let store = state.store::<K>();
    if !store.update(&id, patch).await? {
        return Err(not_found::<K>());
    }
    let item = store.get_by_id(&id).await?.ok_or_else(not_found::<K>)?;
    Ok(ApiResponse::ok(item))
}

pub async fn admin_delete<K: ContentKind>(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.store::<K>().delete(&id).await? {
        return Err(not_found::<K>());
    }
    tracing::info!(kind = K::KIND, id = %id, by = %principal.subject_id, "Content deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET|POST /` and `GET|PUT|DELETE /:id` for one kind
pub fn admin_routes<K: ContentKind>() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin_list::<K>).post(admin_create::<K>))
        .route(
            "/:id",
            get(admin_get::<K>)
                .put(admin_update::<K>)
                .delete(admin_delete::<K>),
        )
}

/// Reviews are created by readers, so staff only moderate them
pub fn review_moderation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin_list::<BlogReview>))
        .route(
            "/:id",
            get(admin_get::<BlogReview>)
                .put(admin_update::<BlogReview>)
                .delete(admin_delete::<BlogReview>),
        )
}
