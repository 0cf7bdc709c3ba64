pub mod auth;
mod bookings;
mod clients;
mod contact;
pub mod content;
pub mod error;
pub mod extract;
mod projects;
pub mod rate_limit;

use axum::{
    http::{
        header::{CONTENT_TYPE, COOKIE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::db::{
    Blog, Book, Category, Faq, ListQuery, Page, Pagination, SortOrder, Tag, Testimonial,
};
use crate::AppState;

/// `{ success: true, data }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// `{ success: true, data: [...], pagination }`
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> ListResponse<T> {
    pub fn from_page(page: Page<T>) -> Json<Self> {
        Json(Self {
            success: true,
            data: page.items,
            pagination: page.pagination,
        })
    }
}

/// Query string accepted by every list endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl ListParams {
    pub fn into_query(self) -> ListQuery {
        ListQuery::new()
            .search(self.search)
            .paginate(self.page, self.limit)
            .sort_by(self.sort, self.order)
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public; each handler sets or clears its own cookie)
    let auth_routes = Router::new()
        .route("/admin/login", post(auth::admin_login))
        .route("/admin/logout", post(auth::admin_logout))
        .route("/admin/me", get(auth::admin_me))
        .route("/client/login", post(auth::client_login))
        .route("/client/logout", post(auth::client_logout))
        .route("/client/me", get(auth::client_me));

    // Staff routes; every handler takes a StaffPrincipal
    let admin_routes = Router::new()
        // Bookings
        .route("/bookings", get(bookings::list_bookings))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", put(bookings::update_booking_status))
        // Clients
        .route("/clients", get(clients::list_clients))
        .route("/clients", post(clients::create_client))
        .route("/clients/:id", get(clients::get_client))
        .route("/clients/:id", put(clients::update_client))
        .route("/clients/:id", delete(clients::delete_client))
        // Projects
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::create_project))
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id", put(projects::update_project))
        .route("/projects/:id", delete(projects::delete_project))
        // Content
        .nest("/blogs", content::admin_routes::<Blog>())
        .nest("/books", content::admin_routes::<Book>())
        .nest("/testimonials", content::admin_routes::<Testimonial>())
        .nest("/faqs", content::admin_routes::<Faq>())
        .nest("/tags", content::admin_routes::<Tag>())
        .nest("/categories", content::admin_routes::<Category>())
        .nest("/reviews", content::review_moderation_routes());

    // Routes shared by both portals; ownership is checked per resource
    let portal_routes = Router::new()
        .route("/client/projects", get(projects::list_client_projects))
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id/milestones", get(projects::list_milestones))
        .route("/projects/:id/milestones", post(projects::create_milestone))
        .route("/milestones/:id", put(projects::update_milestone))
        .route("/milestones/:id", delete(projects::delete_milestone))
        .route("/projects/:id/files", get(projects::list_files))
        .route("/projects/:id/files", post(projects::upload_file))
        .route("/files/:id", delete(projects::delete_file));

    let public_routes = Router::new()
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/availability", get(bookings::availability))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Content
        .route("/blogs", get(content::public_list::<Blog>))
        .route("/blogs/:slug", get(content::get_blog))
        .route("/blogs/:slug/reviews", get(content::list_blog_reviews))
        .route("/blogs/:slug/reviews", post(content::create_blog_review))
        .route("/books", get(content::public_list::<Book>))
        .route("/books/:slug", get(content::get_book))
        .route("/testimonials", get(content::public_list::<Testimonial>))
        .route("/faqs", get(content::public_list::<Faq>))
        .route("/tags", get(content::public_list::<Tag>))
        .route("/categories", get(content::public_list::<Category>));

    let contact_routes = Router::new()
        .route("/contact", post(contact::submit_contact))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_contact,
        ));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest(
            "/api",
            portal_routes.merge(public_routes).merge(contact_routes),
        )
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(&state.config.server) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Credentialed CORS for the configured front-end origins. `None` when no
/// origin is configured, which keeps the API same-origin only.
fn build_cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([CONTENT_TYPE, COOKIE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600)),
    )
}

async fn health_check() -> &'static str {
    "OK"
}
