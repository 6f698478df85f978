//! HTTP router and server

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::api::state::AppState;
use crate::api::{auth, email, notifications, templates, user};

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Build the router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let template_routes = Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route("/extract-variables", post(templates::extract_variables))
        .route(
            "/:id",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/:id/preview", post(templates::preview_template));

    let email_routes = Router::new()
        .route("/send", post(email::send_email))
        .route("/test", post(email::send_test_email))
        .route("/history", get(email::email_history));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/mark-read", post(notifications::mark_read));

    let user_routes = Router::new()
        .route("/profile", get(user::get_profile).put(user::update_profile))
        .route("/change-password", post(user::change_password))
        .route("/security-settings", get(user::get_security_settings))
        .route(
            "/notification-settings",
            get(user::get_notification_settings).put(user::update_notification_settings),
        )
        .route("/sessions", get(user::list_sessions))
        .route("/sessions/revoke", post(user::revoke_sessions))
        .route("/setup-2fa", post(user::setup_two_factor))
        .route("/confirm-2fa", post(user::confirm_two_factor))
        .route("/two-factor/disable", post(user::disable_two_factor));

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_routes)
        .nest("/api/templates", template_routes)
        .nest("/api/email", email_routes)
        .nest("/api/notifications", notification_routes)
        .nest("/api/user", user_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting API server on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await
}
