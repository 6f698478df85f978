//! In-app notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PaletteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EmailSent,
    EmailFailed,
    Security,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::EmailSent => "email_sent",
            NotificationKind::EmailFailed => "email_failed",
            NotificationKind::Security => "security",
            NotificationKind::System => "system",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "email_sent" => Some(NotificationKind::EmailSent),
            "email_failed" => Some(NotificationKind::EmailFailed),
            "security" => Some(NotificationKind::Security),
            "system" => Some(NotificationKind::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Paging and filtering for `list_for_user`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationQuery {
    pub limit: i64,
    pub offset: i64,
    pub unread_only: bool,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            unread_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: i64,
    pub has_more: bool,
}

/// Email channel preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailChannelSettings {
    pub marketing: bool,
    pub email_delivery: bool,
    pub new_features: bool,
    pub security: bool,
}

impl Default for EmailChannelSettings {
    fn default() -> Self {
        Self {
            marketing: true,
            email_delivery: true,
            new_features: true,
            security: true,
        }
    }
}

/// In-app channel preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppChannelSettings {
    pub email_sent: bool,
    pub email_opened: bool,
    pub email_clicked: bool,
    pub email_bounced: bool,
    pub new_templates: bool,
    pub team_invites: bool,
}

impl Default for AppChannelSettings {
    fn default() -> Self {
        Self {
            email_sent: true,
            email_opened: true,
            email_clicked: true,
            email_bounced: true,
            new_templates: true,
            team_invites: true,
        }
    }
}

/// Per-user notification preferences. Every switch defaults to on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email: EmailChannelSettings,
    pub app: AppChannelSettings,
}

impl NotificationSettings {
    /// Whether an in-app notification of `kind` should be created
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::EmailSent => self.app.email_sent,
            NotificationKind::EmailFailed => self.app.email_bounced,
            NotificationKind::Security | NotificationKind::System => true,
        }
    }
}

/// What to mark as read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkRead {
    One(String),
    All,
}

#[derive(Clone)]
pub struct NotificationManager {
    db: SqlitePool,
}

impl NotificationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at)",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_settings (
                user_id TEXT PRIMARY KEY,
                settings TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Stored preferences, or the defaults if the user never saved any
    pub async fn settings(&self, user_id: &str) -> Result<NotificationSettings> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT settings FROM notification_settings WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(NotificationSettings::default()),
        }
    }

    pub async fn update_settings(
        &self,
        user_id: &str,
        settings: NotificationSettings,
    ) -> Result<NotificationSettings> {
        sqlx::query(
            r#"
            INSERT INTO notification_settings (user_id, settings, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(&settings)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(settings)
    }

    /// Create a notification unless the user's preferences turn `kind` off.
    pub async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<Option<Notification>> {
        if !self.settings(user_id).await?.allows(kind) {
            debug!(kind = kind.as_str(), "Notification muted for user {}", user_id);
            return Ok(None);
        }

        self.create(user_id, kind, title, message).await.map(Some)
    }

    pub async fn create(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(notification)
    }

    /// Newest first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        query: NotificationQuery,
    ) -> Result<NotificationPage> {
        let limit = query.limit.clamp(1, 100);
        let offset = query.offset.max(0);

        let mut count =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notifications WHERE user_id = ");
        count.push_bind(user_id);
        if query.unread_only {
            count.push(" AND is_read = 0");
        }
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, kind, title, message, is_read, created_at FROM notifications WHERE user_id = ",
        );
        select.push_bind(user_id);
        if query.unread_only {
            select.push(" AND is_read = 0");
        }
        select.push(" ORDER BY created_at DESC LIMIT ");
        select.push_bind(limit);
        select.push(" OFFSET ");
        select.push_bind(offset);

        let rows = select.build().fetch_all(&self.db).await?;
        let notifications = rows
            .iter()
            .map(row_to_notification)
            .collect::<Result<Vec<_>>>()?;

        Ok(NotificationPage {
            notifications,
            total,
            has_more: offset + limit < total,
        })
    }

    /// Mark one of the user's notifications, or all of them, as read.
    /// Returns the number of rows changed.
    pub async fn mark_read(&self, user_id: &str, target: MarkRead) -> Result<u64> {
        match target {
            MarkRead::All => {
                let result = sqlx::query(
                    "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
                )
                .bind(user_id)
                .execute(&self.db)
                .await?;
                Ok(result.rows_affected())
            }
            MarkRead::One(id) => {
                let owner: Option<String> =
                    sqlx::query_scalar("SELECT user_id FROM notifications WHERE id = ?")
                        .bind(&id)
                        .fetch_optional(&self.db)
                        .await?;

                match owner {
                    None => Err(PaletteError::NotFound("Notification not found".to_string())),
                    Some(owner) if owner != user_id => {
                        Err(PaletteError::Forbidden("Not owner of this notification".to_string()))
                    }
                    Some(_) => {
                        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
                            .bind(&id)
                            .execute(&self.db)
                            .await?;
                        Ok(result.rows_affected())
                    }
                }
            }
        }
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification> {
    let kind: String = row.try_get("kind")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: NotificationKind::from_db_string(&kind)
            .ok_or_else(|| PaletteError::Parse(format!("Invalid notification kind: {}", kind)))?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| PaletteError::Parse(format!("Invalid created_at: {}", e)))?
            .with_timezone(&Utc),
    })
}
