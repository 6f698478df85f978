//! End-to-end tests for the REST API
//!
//! Each test builds the full router on an in-memory database with a
//! transport that records outgoing mail instead of talking to SMTP.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

use palette_mail::api::{router, AppState};
use palette_mail::config::{AuthConfig, Config};
use palette_mail::delivery::{MailTransport, OutgoingEmail};
use palette_mail::{PaletteError, Result};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        if email.recipients.iter().any(|r| r.ends_with("@unreachable.test")) {
            return Err(PaletteError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok("<test@palette-mail>".to_string())
    }
}

struct TestApp {
    router: Router,
    transport: Arc<RecordingTransport>,
}

async fn setup_test_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let config = Config {
        auth: AuthConfig {
            jwt_secret: Some("integration-test-secret".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let transport = Arc::new(RecordingTransport::default());
    let state = AppState::build(&config, pool, transport.clone())
        .await
        .unwrap();

    TestApp {
        router: router(state),
        transport,
    }
}

impl TestApp {
    async fn request(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Register a user and return its session cookie
    async fn register(&self, name: &str, email: &str) -> String {
        let response = self
            .request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "correct horse" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        session_cookie(&response)
    }

    async fn login(&self, email: &str, code: Option<&str>) -> Response {
        self.request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "correct horse", "code": code })),
        )
        .await
    }
}

/// `token=...` pair from the response's Set-Cookie header
fn session_cookie(response: &Response) -> String {
    let header = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap();
    header.split(';').next().unwrap().to_string()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = setup_test_app().await;

    let response = app.request("GET", "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let app = setup_test_app().await;

    let response = app
        .request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ann", "email": "Ann@Example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=604800"));
    // development configuration
    assert!(!set_cookie.contains("Secure"));

    let body = json_body(response).await;
    assert_eq!(body["user"]["email"], "ann@example.com");
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = setup_test_app().await;
    app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "name": "Other", "email": "ANN@example.com", "password": "another pass" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_me_requires_session() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app.request("GET", "/api/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Not authenticated");

    let response = app
        .request("GET", "/api/auth/me", Some("token=not-a-token"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.request("GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"]["name"], "Ann");
    assert_eq!(body["twoFactorEnabled"], false);
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;
    let token = cookie.trim_start_matches("token=");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = setup_test_app().await;
    app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ann@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let unknown = app.login("nobody@example.com", None).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request("POST", "/api/auth/logout", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cleared.starts_with("token=;"));
    assert!(cleared.contains("Max-Age=0"));

    // the signature is still valid, but the session is gone
    let response = app.request("GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // logging out without a session still succeeds
    let response = app.request("POST", "/api/auth/logout", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_management() {
    let app = setup_test_app().await;
    let first = app.register("Ann", "ann@example.com").await;
    let second = session_cookie(&app.login("ann@example.com", None).await);

    let response = app
        .request("GET", "/api/user/sessions", Some(&first), None)
        .await;
    let sessions = json_body(response).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 2);

    let current = sessions
        .iter()
        .find(|s| s["isCurrent"] == true)
        .unwrap();
    let other = sessions
        .iter()
        .find(|s| s["isCurrent"] == false)
        .unwrap();

    // the caller's own session cannot be revoked here
    let response = app
        .request(
            "POST",
            "/api/user/sessions/revoke",
            Some(&first),
            Some(json!({ "sessionId": current["id"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/api/user/sessions/revoke",
            Some(&first),
            Some(json!({ "sessionId": other["id"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request("GET", "/api/auth/me", Some(&second), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.request("GET", "/api/auth/me", Some(&first), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_revoke_all_other_sessions() {
    let app = setup_test_app().await;
    let first = app.register("Ann", "ann@example.com").await;
    let second = session_cookie(&app.login("ann@example.com", None).await);
    let third = session_cookie(&app.login("ann@example.com", None).await);

    let response = app
        .request(
            "POST",
            "/api/user/sessions/revoke",
            Some(&third),
            Some(json!({ "revokeAll": true })),
        )
        .await;
    assert_eq!(json_body(response).await["revoked"], 2);

    for cookie in [&first, &second] {
        let response = app.request("GET", "/api/auth/me", Some(cookie), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app.request("GET", "/api/auth/me", Some(&third), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_template_lifecycle() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/templates",
            Some(&cookie),
            Some(json!({
                "name": "Order shipped",
                "subject": "Order {{orderId}} shipped",
                "html": "<p>Hi {{name}}, order {{orderId}} is on its way.</p>",
                "defaultValues": { "name": "customer" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["variables"], json!(["orderId", "name"]));

    let response = app
        .request(
            "POST",
            &format!("/api/templates/{}/preview", id),
            Some(&cookie),
            Some(json!({ "variables": { "orderId": "A-17" } })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let preview = json_body(response).await;
    assert_eq!(preview["subject"], "Order A-17 shipped");
    assert_eq!(
        preview["body"],
        "<p>Hi customer, order A-17 is on its way.</p>"
    );

    let response = app
        .request(
            "PUT",
            &format!("/api/templates/{}", id),
            Some(&cookie),
            Some(json!({ "name": "Order dispatched" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "Order dispatched");

    let response = app.request("GET", "/api/templates", Some(&cookie), None).await;
    let listed = json_body(response).await;
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"welcome"));
    assert!(ids.contains(&id.as_str()));

    let response = app
        .request("DELETE", &format!("/api/templates/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", &format!("/api/templates/{}", id), Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_private_templates_are_hidden_from_others() {
    let app = setup_test_app().await;
    let owner = app.register("Ann", "ann@example.com").await;
    let other = app.register("Bob", "bob@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/templates",
            Some(&owner),
            Some(json!({ "name": "Private", "subject": "Hi {{name}}" })),
        )
        .await;
    let id = json_body(response).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request("GET", &format!("/api/templates/{}", id), Some(&other), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request("DELETE", &format!("/api/templates/{}", id), Some(&other), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // built-in templates are read-only
    let response = app
        .request("DELETE", "/api/templates/welcome", Some(&owner), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_extract_variables_endpoint() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/templates/extract-variables",
            Some(&cookie),
            Some(json!({
                "blocks": [
                    { "id": "b1", "type": "heading", "content": { "text": "Hello {{name}}" } },
                    { "id": "b2", "type": "button", "content": { "label": "{{cta}}", "url": "{{link}}", "width": 200 } },
                    { "id": "b3", "type": "text", "content": { "text": "Bye {{name}}" } }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["variables"],
        json!(["name", "cta", "link"])
    );

    let response = app
        .request(
            "POST",
            "/api/templates/extract-variables",
            None,
            Some(json!({ "blocks": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_email_records_history() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/email/send",
            Some(&cookie),
            Some(json!({
                "templateId": "welcome",
                "recipients": ["bob@example.com"],
                "variables": { "name": "Bob", "email": "bob@example.com" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["subject"], "Welcome to Our Service!");

    {
        let sent = app.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["bob@example.com".to_string()]);
        assert!(sent[0].html.contains("Welcome, Bob!"));
    }

    let response = app
        .request(
            "POST",
            "/api/email/send",
            Some(&cookie),
            Some(json!({
                "templateId": "welcome",
                "recipients": ["bob@unreachable.test"],
                "variables": { "name": "Bob" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .request("GET", "/api/email/history", Some(&cookie), None)
        .await;
    let body = json_body(response).await;
    assert_eq!(body["stats"], json!({ "total": 2, "success": 1, "failed": 1 }));
    assert_eq!(body["history"].as_array().unwrap().len(), 2);

    let response = app
        .request("GET", "/api/notifications?limit=1", Some(&cookie), None)
        .await;
    let page = json_body(response).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["hasMore"], true);

    let response = app
        .request(
            "POST",
            "/api/notifications/mark-read",
            Some(&cookie),
            Some(json!({ "markAll": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", "/api/notifications?unreadOnly=true", Some(&cookie), None)
        .await;
    assert_eq!(json_body(response).await["total"], 0);
}

#[tokio::test]
async fn test_two_factor_login() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request("POST", "/api/user/setup-2fa", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let setup = json_body(response).await;
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret).to_bytes().unwrap(),
        None,
        String::new(),
    )
    .unwrap();

    let response = app
        .request(
            "POST",
            "/api/user/confirm-2fa",
            Some(&cookie),
            Some(json!({ "code": totp.generate_current().unwrap() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.login("ann@example.com", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let response = app.login("ann@example.com", Some("000000")).await;
    // a fixed code could collide with the real one once in a million runs
    if response.status() != StatusCode::OK {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let code = totp.generate_current().unwrap();
    let response = app.login("ann@example.com", Some(&code)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request("GET", "/api/auth/me", Some(&cookie), None).await;
    assert_eq!(json_body(response).await["twoFactorEnabled"], true);
}

#[tokio::test]
async fn test_change_password() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request(
            "POST",
            "/api/user/change-password",
            Some(&cookie),
            Some(json!({ "currentPassword": "wrong password", "newPassword": "brand new pass" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/api/user/change-password",
            Some(&cookie),
            Some(json!({ "currentPassword": "correct horse", "newPassword": "brand new pass" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.login("ann@example.com", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_settings() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request("GET", "/api/user/security-settings", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request("GET", "/api/user/security-settings", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "twoFactorEnabled": false, "lastPasswordChange": null })
    );

    let response = app
        .request(
            "POST",
            "/api/user/change-password",
            Some(&cookie),
            Some(json!({ "currentPassword": "correct horse", "newPassword": "brand new pass" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", "/api/user/security-settings", Some(&cookie), None)
        .await;
    let body = json_body(response).await;
    assert_eq!(body["twoFactorEnabled"], false);
    assert!(body["lastPasswordChange"].is_string());
}

#[tokio::test]
async fn test_notification_settings_mute_email_sent() {
    let app = setup_test_app().await;
    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request("GET", "/api/user/notification-settings", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let defaults = json_body(response).await;
    assert_eq!(defaults["email"]["marketing"], true);
    assert_eq!(defaults["app"]["emailSent"], true);
    assert_eq!(defaults["app"]["teamInvites"], true);

    let response = app
        .request(
            "PUT",
            "/api/user/notification-settings",
            Some(&cookie),
            Some(json!({ "app": { "emailSent": false } })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = json_body(response).await;
    assert_eq!(saved["app"]["emailSent"], false);
    assert_eq!(saved["app"]["emailBounced"], true);

    let response = app
        .request("GET", "/api/user/notification-settings", Some(&cookie), None)
        .await;
    assert_eq!(json_body(response).await, saved);

    let response = app
        .request(
            "POST",
            "/api/email/send",
            Some(&cookie),
            Some(json!({
                "templateId": "welcome",
                "recipients": ["bob@example.com"],
                "variables": { "name": "Bob" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request("GET", "/api/notifications", Some(&cookie), None)
        .await;
    assert_eq!(json_body(response).await["total"], 0);

    // failures are still reported
    let response = app
        .request(
            "POST",
            "/api/email/send",
            Some(&cookie),
            Some(json!({
                "templateId": "welcome",
                "recipients": ["bob@unreachable.test"],
                "variables": { "name": "Bob" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .request("GET", "/api/notifications", Some(&cookie), None)
        .await;
    let page = json_body(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["notifications"][0]["kind"], "email_failed");
}

#[tokio::test]
async fn test_send_test_email() {
    let app = setup_test_app().await;

    let response = app
        .request(
            "POST",
            "/api/email/test",
            None,
            Some(json!({ "email": "ops@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = app.register("Ann", "ann@example.com").await;

    let response = app
        .request("POST", "/api/email/test", Some(&cookie), Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            "POST",
            "/api/email/test",
            Some(&cookie),
            Some(json!({ "email": "ops@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["emailInfo"]["to"], "ops@example.com");
    assert_eq!(body["emailInfo"]["subject"], "PaletteMail Test Email");
    assert_eq!(body["emailInfo"]["template"], "welcome");

    {
        let sent = app.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "PaletteMail Test Email");
        assert_eq!(sent[0].sender_name, "PaletteMail Test");
        assert!(sent[0].html.contains("Welcome, Test User!"));
    }

    // test sends leave no history
    let response = app
        .request("GET", "/api/email/history", Some(&cookie), None)
        .await;
    assert_eq!(json_body(response).await["stats"]["total"], 0);
}
