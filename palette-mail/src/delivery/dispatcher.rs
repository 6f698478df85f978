//! Template-based sending with history and notifications

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::history::{DeliveryStatus, HistoryManager, NewHistoryEntry};
use super::notifications::{NotificationKind, NotificationManager};
use super::transport::{MailTransport, OutgoingEmail};
use crate::error::{PaletteError, Result};
use crate::templates::{builtin_template, Bindings, TemplateCompiler, TemplateManager};

/// Binding added to every send
pub const BASE_URL_VAR: &str = "baseUrl";
/// Binding that overrides the From display name
pub const SENDER_NAME_VAR: &str = "senderName";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub template_id: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub variables: Bindings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub history_id: Option<String>,
    pub message_id: String,
    pub subject: String,
}

/// Built-in template used for SMTP test sends
pub const TEST_TEMPLATE_ID: &str = "welcome";
pub const TEST_SUBJECT: &str = "PaletteMail Test Email";
const TEST_SENDER_NAME: &str = "PaletteMail Test";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailReport {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub message_id: String,
}

#[derive(Clone)]
pub struct EmailDispatcher {
    templates: TemplateManager,
    history: HistoryManager,
    notifications: NotificationManager,
    transport: Arc<dyn MailTransport>,
    base_url: String,
    default_sender_name: String,
}

impl EmailDispatcher {
    pub fn new(
        templates: TemplateManager,
        history: HistoryManager,
        notifications: NotificationManager,
        transport: Arc<dyn MailTransport>,
        base_url: impl Into<String>,
        default_sender_name: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            history,
            notifications,
            transport,
            base_url: base_url.into(),
            default_sender_name: default_sender_name.into(),
        }
    }

    /// Compile a template for `user_id` and send it.
    ///
    /// Transport failures are recorded in history before being returned.
    pub async fn send(&self, user_id: &str, request: SendEmailRequest) -> Result<DeliveryReport> {
        let recipients: Vec<String> = request
            .recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(PaletteError::Validation(
                "At least one recipient is required".to_string(),
            ));
        }

        let template = self
            .templates
            .get_for_user(&request.template_id, user_id)
            .await?;

        let mut bindings = request.variables.clone();
        bindings.insert(BASE_URL_VAR.to_string(), self.base_url.clone());
        let compiled = TemplateCompiler::compile_template(&template, &bindings);

        let sender_name = request
            .variables
            .get(SENDER_NAME_VAR)
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| self.default_sender_name.clone());

        info!(
            template = %template.id,
            recipients = recipients.len(),
            "Sending email"
        );

        let email = OutgoingEmail {
            sender_name,
            recipients: recipients.clone(),
            subject: compiled.subject.clone(),
            html: compiled.body.clone(),
        };

        match self.transport.send(&email).await {
            Ok(message_id) => {
                let history_id = self
                    .record(
                        user_id,
                        NewHistoryEntry {
                            template_id: template.id.clone(),
                            subject: compiled.subject.clone(),
                            recipients: recipients.clone(),
                            content: compiled.body,
                            status: DeliveryStatus::Success,
                            error_message: None,
                        },
                    )
                    .await;
                self.notify(
                    user_id,
                    NotificationKind::EmailSent,
                    "Email sent",
                    &format!("\"{}\" sent to {}", compiled.subject, recipients.join(", ")),
                )
                .await;

                Ok(DeliveryReport {
                    history_id,
                    message_id,
                    subject: compiled.subject,
                })
            }
            Err(e) => {
                warn!(template = %template.id, error = %e, "Email delivery failed");
                self.record(
                    user_id,
                    NewHistoryEntry {
                        template_id: template.id.clone(),
                        subject: compiled.subject.clone(),
                        recipients: recipients.clone(),
                        content: serde_json::to_string(&request.variables)?,
                        status: DeliveryStatus::Failed,
                        error_message: Some(e.to_string()),
                    },
                )
                .await;
                self.notify(
                    user_id,
                    NotificationKind::EmailFailed,
                    "Email failed",
                    &format!("\"{}\" could not be sent: {}", compiled.subject, e),
                )
                .await;

                Err(e)
            }
        }
    }

    /// Send the welcome template to `to` to check the mail setup.
    ///
    /// Nothing is written to history or notifications.
    pub async fn send_test(&self, to: &str) -> Result<TestEmailReport> {
        let to = to.trim();
        if to.is_empty() {
            return Err(PaletteError::Validation(
                "Email address is required".to_string(),
            ));
        }
        if !to.contains('@') {
            return Err(PaletteError::Validation(
                "A valid email address is required".to_string(),
            ));
        }

        let template = builtin_template(TEST_TEMPLATE_ID).ok_or_else(|| {
            PaletteError::NotFound(format!("Template {} not found", TEST_TEMPLATE_ID))
        })?;

        let bindings: Bindings = [
            ("name", "Test User".to_string()),
            ("email", to.to_string()),
            ("loginLink", format!("{}/login", self.base_url)),
            (SENDER_NAME_VAR, TEST_SENDER_NAME.to_string()),
            (BASE_URL_VAR, self.base_url.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let compiled = TemplateCompiler::compile_template(&template, &bindings);

        info!(template = %template.id, "Sending test email");
        let message_id = self
            .transport
            .send(&OutgoingEmail {
                sender_name: TEST_SENDER_NAME.to_string(),
                recipients: vec![to.to_string()],
                subject: TEST_SUBJECT.to_string(),
                html: compiled.body,
            })
            .await?;

        Ok(TestEmailReport {
            to: to.to_string(),
            subject: TEST_SUBJECT.to_string(),
            template: template.id,
            message_id,
        })
    }

    // History and notifications must not change the outcome of a send
    async fn record(&self, user_id: &str, entry: NewHistoryEntry) -> Option<String> {
        match self.history.record(user_id, entry).await {
            Ok(history) => Some(history.id),
            Err(e) => {
                warn!("Failed to save email history: {}", e);
                None
            }
        }
    }

    async fn notify(&self, user_id: &str, kind: NotificationKind, title: &str, message: &str) {
        if let Err(e) = self.notifications.notify(user_id, kind, title, message).await {
            warn!("Failed to create notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::history::HistoryStats;
    use crate::delivery::notifications::{NotificationQuery, NotificationSettings};
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<String> {
            if self.fail {
                return Err(PaletteError::Transport("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok("queued".to_string())
        }
    }

    async fn dispatcher(
        transport: Arc<RecordingTransport>,
    ) -> (EmailDispatcher, HistoryManager, NotificationManager) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let templates = TemplateManager::new(pool.clone());
        let history = HistoryManager::new(pool.clone());
        let notifications = NotificationManager::new(pool);
        templates.init_db().await.unwrap();
        history.init_db().await.unwrap();
        notifications.init_db().await.unwrap();

        let dispatcher = EmailDispatcher::new(
            templates,
            history.clone(),
            notifications.clone(),
            transport,
            "https://mail.example.com",
            "PaletteMail",
        );
        (dispatcher, history, notifications)
    }

    fn request(variables: &[(&str, &str)]) -> SendEmailRequest {
        SendEmailRequest {
            template_id: "welcome".to_string(),
            recipients: vec!["ann@example.com".to_string()],
            variables: variables
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_send_compiles_and_records() {
        let transport = Arc::new(RecordingTransport::default());
        let (dispatcher, history, notifications) = dispatcher(transport.clone()).await;

        let report = dispatcher
            .send(
                "u1",
                request(&[
                    ("name", "Ann"),
                    ("email", "ann@example.com"),
                    ("loginLink", "{{baseUrl}}/login"),
                    ("senderName", "Team Palette"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(report.subject, "Welcome to Our Service!");
        assert!(report.history_id.is_some());

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sender_name, "Team Palette");
        assert!(sent[0].html.contains("Welcome, Ann!"));
        // bound values are inserted verbatim
        assert!(sent[0].html.contains("href=\"{{baseUrl}}/login\""));

        assert_eq!(
            history.stats("u1").await.unwrap(),
            HistoryStats {
                total: 1,
                success: 1,
                failed: 0
            }
        );
        let page = notifications
            .list_for_user("u1", NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.notifications[0].kind, NotificationKind::EmailSent);
    }

    #[tokio::test]
    async fn test_default_sender_name() {
        let transport = Arc::new(RecordingTransport::default());
        let (dispatcher, _, _) = dispatcher(transport.clone()).await;

        dispatcher.send("u1", request(&[])).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap()[0].sender_name, "PaletteMail");
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let (dispatcher, history, notifications) = dispatcher(transport).await;

        let result = dispatcher.send("u1", request(&[("name", "Ann")])).await;
        assert!(matches!(result, Err(PaletteError::Transport(_))));

        let entries = history.list_for_user("u1", 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DeliveryStatus::Failed);
        assert!(entries[0]
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("connection refused"));

        let page = notifications
            .list_for_user("u1", NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.notifications[0].kind, NotificationKind::EmailFailed);
    }

    #[tokio::test]
    async fn test_muted_notifications_are_skipped() {
        let transport = Arc::new(RecordingTransport::default());
        let (dispatcher, history, notifications) = dispatcher(transport).await;

        let mut settings = NotificationSettings::default();
        settings.app.email_sent = false;
        notifications.update_settings("u1", settings).await.unwrap();

        dispatcher.send("u1", request(&[("name", "Ann")])).await.unwrap();

        assert_eq!(history.stats("u1").await.unwrap().success, 1);
        let page = notifications
            .list_for_user("u1", NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_send_test_uses_welcome_template() {
        let transport = Arc::new(RecordingTransport::default());
        let (dispatcher, history, _) = dispatcher(transport.clone()).await;

        let report = dispatcher.send_test(" ops@example.com ").await.unwrap();
        assert_eq!(report.to, "ops@example.com");
        assert_eq!(report.subject, "PaletteMail Test Email");
        assert_eq!(report.template, "welcome");

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["ops@example.com"]);
        assert_eq!(sent[0].sender_name, "PaletteMail Test");
        assert!(sent[0].html.contains("Welcome, Test User!"));
        assert!(sent[0].html.contains("https://mail.example.com/login"));

        assert_eq!(history.stats("u1").await.unwrap().total, 0);
        assert!(matches!(
            dispatcher.send_test("").await,
            Err(PaletteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_recipients_and_known_template() {
        let transport = Arc::new(RecordingTransport::default());
        let (dispatcher, history, _) = dispatcher(transport).await;

        let mut no_recipients = request(&[]);
        no_recipients.recipients = vec!["  ".to_string()];
        assert!(matches!(
            dispatcher.send("u1", no_recipients).await,
            Err(PaletteError::Validation(_))
        ));

        let mut unknown = request(&[]);
        unknown.template_id = "missing".to_string();
        assert!(matches!(
            dispatcher.send("u1", unknown).await,
            Err(PaletteError::NotFound(_))
        ));

        assert_eq!(history.stats("u1").await.unwrap().total, 0);
    }
}
