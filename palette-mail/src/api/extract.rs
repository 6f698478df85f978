//! Request extractors

use axum::{
    extract::FromRequestParts,
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::api::state::AppState;
use crate::error::PaletteError;
use crate::session::{token_from_headers, ClientInfo, IdentityPayload};

/// The authenticated caller of a protected route.
///
/// Reads the `token` cookie (or a Bearer header), verifies it and rejects
/// revoked tokens. Every failure is a plain 401.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: IdentityPayload,
    /// Raw token, used to tell the current session apart
    pub token: String,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.identity.subject_id
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = PaletteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(PaletteError::Unauthenticated)?;
        let identity = state
            .guard
            .authenticate(&token, state.sessions.revocations())
            .map_err(|_| PaletteError::Unauthenticated)?;

        Ok(Self { identity, token })
    }
}

/// Client details for session records
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    ClientInfo {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
    }
}
