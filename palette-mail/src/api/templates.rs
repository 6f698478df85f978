//! Template endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::auth::MessageResponse;
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::error::Result;
use crate::templates::{
    Bindings, Block, CompiledTemplate, CreateTemplateRequest, EmailTemplate, TemplateCompiler,
    UpdateTemplateRequest,
};

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub variables: Bindings,
}

#[derive(Debug, Deserialize)]
pub struct ExtractVariablesRequest {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
pub struct ExtractVariablesResponse {
    pub variables: Vec<String>,
}

/// GET /api/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<EmailTemplate>>> {
    Ok(Json(state.templates.list_for_user(current.id()).await?))
}

/// POST /api/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<EmailTemplate>)> {
    let template = state.templates.create(current.id(), req).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /api/templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<EmailTemplate>> {
    Ok(Json(state.templates.get_for_user(&id, current.id()).await?))
}

/// PUT /api/templates/:id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<EmailTemplate>> {
    Ok(Json(state.templates.update(&id, current.id(), req).await?))
}

/// DELETE /api/templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.templates.delete(&id, current.id()).await?;
    Ok(MessageResponse::ok("Template deleted"))
}

/// POST /api/templates/:id/preview
///
/// Unbound variables show up as `[name]`.
pub async fn preview_template(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<CompiledTemplate>> {
    let template = state.templates.get_for_user(&id, current.id()).await?;
    Ok(Json(TemplateCompiler::compile_template(
        &template,
        &req.variables,
    )))
}

/// POST /api/templates/extract-variables
pub async fn extract_variables(
    _current: CurrentUser,
    Json(req): Json<ExtractVariablesRequest>,
) -> Json<ExtractVariablesResponse> {
    Json(ExtractVariablesResponse {
        variables: TemplateCompiler::extract_variables(&req.blocks),
    })
}
