//! Sending and history endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::delivery::{
    DeliveryReport, EmailHistory, HistoryStats, SendEmailRequest, TestEmailReport,
};
use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryQuery {
    pub limit: i64,
    pub offset: i64,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailResponse {
    pub success: bool,
    pub message: String,
    pub email_info: TestEmailReport,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<EmailHistory>,
    pub stats: HistoryStats,
}

/// POST /api/email/send
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<DeliveryReport>> {
    Ok(Json(state.dispatcher.send(current.id(), req).await?))
}

/// POST /api/email/test
pub async fn send_test_email(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<TestEmailRequest>,
) -> Result<Json<TestEmailResponse>> {
    tracing::info!("Test email requested by user {}", current.id());
    let report = state.dispatcher.send_test(&req.email).await?;
    Ok(Json(TestEmailResponse {
        success: true,
        message: "Test email sent successfully".to_string(),
        email_info: report,
    }))
}

/// GET /api/email/history
pub async fn email_history(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    Ok(Json(HistoryResponse {
        history: state
            .history
            .list_for_user(current.id(), limit, offset)
            .await?,
        stats: state.history.stats(current.id()).await?,
    }))
}
