use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::extract::JsonBody;
use crate::auth::{Principal, ADMIN_COOKIE, CLIENT_COOKIE, CLIENT_ROLES, STAFF_ROLES};
use crate::db::{AdminUser, Client};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse<A> {
    pub success: bool,
    pub user: A,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// A verified admin or founder session
#[derive(Debug, Clone)]
pub struct StaffPrincipal(pub Principal);

/// A verified client portal session
#[derive(Debug, Clone)]
pub struct ClientPrincipal(pub Principal);

/// Either kind of session, staff first
#[derive(Debug, Clone)]
pub struct AnyPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let principal = state.gate.authenticate(&jar, STAFF_ROLES).await?;
        Ok(Self(principal))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let principal = state.gate.authenticate(&jar, CLIENT_ROLES).await?;
        Ok(Self(principal))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AnyPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let principal = state.gate.authenticate_any(&jar).await?;
        Ok(Self(principal))
    }
}

/// Staff login; sets the `admin_token` cookie
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<AccountResponse<AdminUser>>), ApiError> {
    let session = state
        .gate
        .login_staff(&request.email, &request.password)
        .await?;
    let cookie = state
        .gate
        .session_cookie(ADMIN_COOKIE, session.token, session.ttl);

    Ok((
        jar.add(cookie),
        Json(AccountResponse {
            success: true,
            user: session.account,
        }),
    ))
}

pub async fn admin_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    (
        jar.add(state.gate.clear_cookie(ADMIN_COOKIE)),
        Json(LogoutResponse { success: true }),
    )
}

pub async fn admin_me(
    State(state): State<Arc<AppState>>,
    StaffPrincipal(principal): StaffPrincipal,
) -> Result<Json<AccountResponse<AdminUser>>, ApiError> {
    let user = state.gate.staff_account(&principal).await?;
    Ok(Json(AccountResponse {
        success: true,
        user,
    }))
}

/// Client portal login; sets the `client_token` cookie
pub async fn client_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<AccountResponse<Client>>), ApiError> {
    let session = state
        .gate
        .login_client(&request.email, &request.password)
        .await?;
    let cookie = state
        .gate
        .session_cookie(CLIENT_COOKIE, session.token, session.ttl);

    Ok((
        jar.add(cookie),
        Json(AccountResponse {
            success: true,
            user: session.account,
        }),
    ))
}

pub async fn client_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    (
        jar.add(state.gate.clear_cookie(CLIENT_COOKIE)),
        Json(LogoutResponse { success: true }),
    )
}

pub async fn client_me(
    State(state): State<Arc<AppState>>,
    ClientPrincipal(principal): ClientPrincipal,
) -> Result<Json<AccountResponse<Client>>, ApiError> {
    let user = state.gate.client_account(&principal).await?;
    Ok(Json(AccountResponse {
        success: true,
        user,
    }))
}
