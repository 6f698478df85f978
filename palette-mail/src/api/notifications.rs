//! Notification endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::MessageResponse;
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::delivery::{MarkRead, NotificationPage, NotificationQuery};
use crate::error::{PaletteError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_id: Option<String>,
    #[serde(default)]
    pub mark_all: bool,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>> {
    Ok(Json(
        state
            .notifications
            .list_for_user(current.id(), query)
            .await?,
    ))
}

/// POST /api/notifications/mark-read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<MessageResponse>> {
    let target = match (req.mark_all, req.notification_id) {
        (true, _) => MarkRead::All,
        (false, Some(id)) => MarkRead::One(id),
        (false, None) => {
            return Err(PaletteError::Validation(
                "Either notificationId or markAll is required".to_string(),
            ))
        }
    };

    let message = match target {
        MarkRead::All => "All notifications marked as read",
        MarkRead::One(_) => "Notification marked as read",
    };
    state.notifications.mark_read(current.id(), target).await?;
    Ok(MessageResponse::ok(message))
}
