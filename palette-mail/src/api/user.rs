//! Profile, password, sessions and two-factor endpoints

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::accounts::{ChangePasswordRequest, UpdateProfileRequest, User};
use crate::api::auth::MessageResponse;
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::delivery::{NotificationKind, NotificationSettings};
use crate::error::{PaletteError, Result};
use crate::mfa::TwoFactorSetup;
use crate::session::SessionInfo;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub revoke_all: bool,
}

#[derive(Debug, Serialize)]
pub struct RevokeSessionResponse {
    pub success: bool,
    pub revoked: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettingsResponse {
    pub two_factor_enabled: bool,
    pub last_password_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// GET /api/user/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<User>> {
    state
        .users
        .get(current.id())
        .await?
        .map(Json)
        .ok_or_else(|| PaletteError::NotFound("User not found".to_string()))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    Ok(Json(
        state.users.update_profile(current.id(), &req.name).await?,
    ))
}

/// POST /api/user/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .users
        .change_password(current.id(), &req.current_password, &req.new_password)
        .await?;
    notify_security(&state, current.id(), "Password changed").await;
    Ok(MessageResponse::ok("Password updated successfully"))
}

/// GET /api/user/security-settings
pub async fn get_security_settings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<SecuritySettingsResponse>> {
    Ok(Json(SecuritySettingsResponse {
        two_factor_enabled: state.mfa.is_enabled(current.id()).await?,
        last_password_change: state.users.last_password_change(current.id()).await?,
    }))
}

/// GET /api/user/notification-settings
pub async fn get_notification_settings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<NotificationSettings>> {
    Ok(Json(state.notifications.settings(current.id()).await?))
}

/// PUT /api/user/notification-settings
pub async fn update_notification_settings(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(settings): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>> {
    Ok(Json(
        state
            .notifications
            .update_settings(current.id(), settings)
            .await?,
    ))
}

/// GET /api/user/sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<SessionInfo>>> {
    Ok(Json(
        state
            .sessions
            .list_active(current.id(), Some(&current.token))
            .await?,
    ))
}

/// POST /api/user/sessions/revoke
pub async fn revoke_sessions(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<RevokeSessionRequest>,
) -> Result<Json<RevokeSessionResponse>> {
    let revoked = match (req.revoke_all, req.session_id) {
        (true, _) => {
            state
                .sessions
                .revoke_all_except(current.id(), &current.token)
                .await?
        }
        (false, Some(session_id)) => {
            state
                .sessions
                .revoke(current.id(), &session_id, Some(&current.token))
                .await?;
            1
        }
        (false, None) => {
            return Err(PaletteError::Validation(
                "Either sessionId or revokeAll is required".to_string(),
            ))
        }
    };

    Ok(Json(RevokeSessionResponse {
        success: true,
        revoked,
    }))
}

/// POST /api/user/setup-2fa
pub async fn setup_two_factor(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<TwoFactorSetup>> {
    Ok(Json(
        state
            .mfa
            .start_setup(current.id(), &current.identity.email)
            .await?,
    ))
}

/// POST /api/user/confirm-2fa
pub async fn confirm_two_factor(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<CodeRequest>,
) -> Result<Json<MessageResponse>> {
    if req.code.trim().is_empty() {
        return Err(PaletteError::Validation(
            "Verification code is required".to_string(),
        ));
    }

    state.mfa.confirm(current.id(), &req.code).await?;
    notify_security(&state, current.id(), "Two-factor authentication enabled").await;
    Ok(MessageResponse::ok(
        "Two-factor authentication verified successfully",
    ))
}

/// POST /api/user/two-factor/disable
pub async fn disable_two_factor(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<CodeRequest>,
) -> Result<Json<MessageResponse>> {
    state.mfa.disable(current.id(), &req.code).await?;
    notify_security(&state, current.id(), "Two-factor authentication disabled").await;
    Ok(MessageResponse::ok(
        "Two-factor authentication disabled successfully",
    ))
}

async fn notify_security(state: &AppState, user_id: &str, title: &str) {
    if let Err(e) = state
        .notifications
        .notify(user_id, NotificationKind::Security, title, "Account security settings changed")
        .await
    {
        tracing::warn!("Failed to create notification: {}", e);
    }
}
