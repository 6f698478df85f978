use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Two-factor authentication failed: {0}")]
    TwoFactor(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

pub type Result<T> = std::result::Result<T, PaletteError>;

/// JSON error body returned by every API handler
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}

impl PaletteError {
    pub fn status(&self) -> StatusCode {
        match self {
            PaletteError::Validation(_) | PaletteError::TwoFactor(_) => StatusCode::BAD_REQUEST,
            PaletteError::NotFound(_) => StatusCode::NOT_FOUND,
            PaletteError::Conflict(_) => StatusCode::CONFLICT,
            PaletteError::Forbidden(_) => StatusCode::FORBIDDEN,
            PaletteError::Unauthenticated | PaletteError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            PaletteError::Transport(_) => StatusCode::BAD_GATEWAY,
            PaletteError::Io(_)
            | PaletteError::Config(_)
            | PaletteError::Database(_)
            | PaletteError::Json(_)
            | PaletteError::Parse(_)
            | PaletteError::Token(_)
            | PaletteError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaletteError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            ApiError::new("Internal server error")
        } else {
            ApiError {
                error: self.to_string(),
            }
        };

        (status, Json(body)).into_response()
    }
}
