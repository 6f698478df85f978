//! Sent-mail history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{PaletteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(DeliveryStatus::Success),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One send attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailHistory {
    pub id: String,
    pub user_id: String,
    pub template_id: String,
    pub subject: String,
    pub recipients: Vec<String>,
    /// Compiled HTML on success, the bindings as JSON on failure
    pub content: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Fields supplied when recording an attempt
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub template_id: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub content: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
}

#[derive(Clone)]
pub struct HistoryManager {
    db: SqlitePool,
}

impl HistoryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS email_history (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                template_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                recipients TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                sent_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_user ON email_history(user_id, sent_at)")
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn record(&self, user_id: &str, entry: NewHistoryEntry) -> Result<EmailHistory> {
        let history = EmailHistory {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            template_id: entry.template_id,
            subject: entry.subject,
            recipients: entry.recipients,
            content: entry.content,
            status: entry.status,
            error_message: entry.error_message,
            sent_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO email_history (
                id, user_id, template_id, subject, recipients, content,
                status, error_message, sent_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&history.id)
        .bind(&history.user_id)
        .bind(&history.template_id)
        .bind(&history.subject)
        .bind(serde_json::to_string(&history.recipients)?)
        .bind(&history.content)
        .bind(history.status.as_str())
        .bind(&history.error_message)
        .bind(history.sent_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(history)
    }

    /// Most recent first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EmailHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, template_id, subject, recipients, content,
                   status, error_message, sent_at
            FROM email_history
            WHERE user_id = ?
            ORDER BY sent_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    pub async fn stats(&self, user_id: &str) -> Result<HistoryStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM email_history WHERE user_id = ? GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut stats = HistoryStats::default();
        for (status, count) in rows {
            match DeliveryStatus::from_db_string(&status) {
                Some(DeliveryStatus::Success) => stats.success += count,
                Some(DeliveryStatus::Failed) => stats.failed += count,
                None => {}
            }
            stats.total += count;
        }
        Ok(stats)
    }
}

fn row_to_history(row: &SqliteRow) -> Result<EmailHistory> {
    let recipients: String = row.try_get("recipients")?;
    let status: String = row.try_get("status")?;
    let sent_at: String = row.try_get("sent_at")?;

    Ok(EmailHistory {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        template_id: row.try_get("template_id")?,
        subject: row.try_get("subject")?,
        recipients: serde_json::from_str(&recipients)?,
        content: row.try_get("content")?,
        status: DeliveryStatus::from_db_string(&status)
            .ok_or_else(|| PaletteError::Parse(format!("Invalid status: {}", status)))?,
        error_message: row.try_get("error_message")?,
        sent_at: DateTime::parse_from_rfc3339(&sent_at)
            .map_err(|e| PaletteError::Parse(format!("Invalid sent_at: {}", e)))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn manager() -> HistoryManager {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let manager = HistoryManager::new(pool);
        manager.init_db().await.unwrap();
        manager
    }

    fn entry(status: DeliveryStatus) -> NewHistoryEntry {
        NewHistoryEntry {
            template_id: "welcome".to_string(),
            subject: "Welcome".to_string(),
            recipients: vec!["ann@example.com".to_string()],
            content: "<p>Hi</p>".to_string(),
            status,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let history = manager().await;
        let recorded = history
            .record("u1", entry(DeliveryStatus::Success))
            .await
            .unwrap();
        history
            .record("u2", entry(DeliveryStatus::Success))
            .await
            .unwrap();

        let listed = history.list_for_user("u1", 10, 0).await.unwrap();
        assert_eq!(listed, vec![recorded]);
    }

    #[tokio::test]
    async fn test_stats() {
        let history = manager().await;
        for status in [
            DeliveryStatus::Success,
            DeliveryStatus::Success,
            DeliveryStatus::Failed,
        ] {
            history.record("u1", entry(status)).await.unwrap();
        }

        let stats = history.stats("u1").await.unwrap();
        assert_eq!(
            stats,
            HistoryStats {
                total: 3,
                success: 2,
                failed: 1
            }
        );
        assert_eq!(history.stats("u2").await.unwrap(), HistoryStats::default());
    }
}
