//! Registration, login and logout

use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::accounts::{LoginRequest, RegisterRequest, User};
use crate::api::extract::{client_info, CurrentUser};
use crate::api::state::AppState;
use crate::error::{PaletteError, Result};
use crate::session::{token_from_headers, Subject, TOKEN_LIFETIME_SECS};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    pub two_factor_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Issue a token, record the session and return the cookie header
async fn start_session(
    state: &AppState,
    user: &User,
    request_headers: &HeaderMap,
) -> Result<HeaderMap> {
    let now = Utc::now();
    let token = state.guard.issue_at(&Subject::from(user), now)?;

    state
        .sessions
        .record(
            &user.id,
            &token,
            now + Duration::seconds(TOKEN_LIFETIME_SECS),
            &client_info(request_headers),
        )
        .await?;

    let mut headers = HeaderMap::new();
    state.guard.attach_to_response(&mut headers, &token);
    Ok(headers)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    request_headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let user = state.users.register(&req.name, &req.email, &req.password).await?;
    let cookie = start_session(&state, &user, &request_headers).await?;

    Ok((
        StatusCode::CREATED,
        cookie,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    request_headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let user = state
        .users
        .authenticate(&req.email, &req.password)
        .await?
        .ok_or(PaletteError::InvalidCredentials)?;

    state.mfa.check_code(&user.id, req.code.as_deref()).await?;

    let cookie = start_session(&state, &user, &request_headers).await?;
    info!("User {} logged in", user.id);

    Ok((
        cookie,
        Json(AuthResponse {
            message: "Login successful".to_string(),
            user,
        }),
    ))
}

/// POST /api/auth/logout
///
/// Always clears the cookie; a presented token is also revoked.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    request_headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = token_from_headers(&request_headers) {
        if let Err(e) = state.sessions.revoke_token(&token).await {
            warn!("Failed to revoke session on logout: {}", e);
        }
    }

    let mut headers = HeaderMap::new();
    state.guard.clear(&mut headers);
    (headers, MessageResponse::ok("Logged out successfully"))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<MeResponse>> {
    let user = state
        .users
        .get(current.id())
        .await?
        .ok_or_else(|| PaletteError::NotFound("User not found".to_string()))?;
    let two_factor_enabled = state.mfa.is_enabled(&user.id).await?;

    Ok(Json(MeResponse {
        user,
        two_factor_enabled,
    }))
}
