//! Persisted sessions and revocation

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PaletteError, Result};
use crate::session::guard::TOKEN_LIFETIME_SECS;
use crate::session::revocation::{token_fingerprint, RevocationList};

/// Client details recorded with a session
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Active session as shown to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

/// Session records keyed by token fingerprint
#[derive(Clone)]
pub struct SessionManager {
    db: SqlitePool,
    revocations: RevocationList,
}

impl SessionManager {
    pub fn new(db: SqlitePool, revocations: RevocationList) -> Self {
        Self { db, revocations }
    }

    /// Initialize the sessions table
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL UNIQUE,
                user_agent TEXT,
                ip_address TEXT,
                created_at TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                is_revoked INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)")
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// The revocation list kept in sync with this store
    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Record a freshly issued token
    pub async fn record(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
        client: &ClientInfo,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, fingerprint, user_agent, ip_address, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(token_fingerprint(token))
        .bind(&client.user_agent)
        .bind(&client.ip_address)
        .bind(Utc::now().to_rfc3339())
        .bind(expires_at.timestamp())
        .execute(&self.db)
        .await?;

        debug!("Session {} recorded for user {}", id, user_id);
        Ok(id)
    }

    /// Unrevoked, unexpired sessions for a user
    pub async fn list_active(
        &self,
        user_id: &str,
        current_token: Option<&str>,
    ) -> Result<Vec<SessionInfo>> {
        let current = current_token.map(token_fingerprint);

        let rows = sqlx::query(
            r#"
            SELECT id, fingerprint, user_agent, ip_address, created_at, expires_at
            FROM sessions
            WHERE user_id = ? AND is_revoked = 0 AND expires_at > ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(Utc::now().timestamp())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<SessionInfo> {
                let fingerprint: String = row.try_get("fingerprint")?;
                let created_at: String = row.try_get("created_at")?;
                let expires_at: i64 = row.try_get("expires_at")?;

                Ok(SessionInfo {
                    id: row.try_get("id")?,
                    user_agent: row.try_get("user_agent")?,
                    ip_address: row.try_get("ip_address")?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| PaletteError::Parse(format!("Invalid created_at: {}", e)))?
                        .with_timezone(&Utc),
                    expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_default(),
                    is_current: current.as_deref() == Some(fingerprint.as_str()),
                })
            })
            .collect()
    }

    /// Revoke one of the user's other sessions
    pub async fn revoke(
        &self,
        user_id: &str,
        session_id: &str,
        current_token: Option<&str>,
    ) -> Result<()> {
        let fingerprint: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM sessions WHERE id = ? AND user_id = ?")
                .bind(session_id)
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        let fingerprint =
            fingerprint.ok_or_else(|| PaletteError::NotFound("Session not found".to_string()))?;

        if current_token.map(token_fingerprint).as_deref() == Some(fingerprint.as_str()) {
            return Err(PaletteError::Validation(
                "Cannot revoke current session".to_string(),
            ));
        }

        let revoked: Vec<(String, i64)> = sqlx::query_as(
            "UPDATE sessions SET is_revoked = 1 WHERE id = ? RETURNING fingerprint, expires_at",
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        self.revocations.revoke_all(with_expiry(revoked));
        info!("Session {} revoked for user {}", session_id, user_id);
        Ok(())
    }

    /// Revoke every session of the user except the one holding `current_token`
    pub async fn revoke_all_except(&self, user_id: &str, current_token: &str) -> Result<usize> {
        let current = token_fingerprint(current_token);

        // One statement, so every row it revokes is also returned
        let revoked: Vec<(String, i64)> = sqlx::query_as(
            r#"
            UPDATE sessions SET is_revoked = 1
            WHERE user_id = ? AND fingerprint != ? AND is_revoked = 0
            RETURNING fingerprint, expires_at
            "#,
        )
        .bind(user_id)
        .bind(&current)
        .fetch_all(&self.db)
        .await?;

        let count = revoked.len();
        self.revocations.revoke_all(with_expiry(revoked));
        info!("Revoked {} other sessions for user {}", count, user_id);
        Ok(count)
    }

    /// Revoke the session for a token (logout)
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let fingerprint = token_fingerprint(token);

        let expires_at: Option<i64> = sqlx::query_scalar(
            "UPDATE sessions SET is_revoked = 1 WHERE fingerprint = ? RETURNING expires_at",
        )
        .bind(&fingerprint)
        .fetch_optional(&self.db)
        .await?;

        // Without a record, no token can outlive a full lifetime from now
        let expires_at = expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(TOKEN_LIFETIME_SECS));

        self.revocations.revoke(fingerprint, expires_at);
        Ok(())
    }

    /// Load revoked, still-unexpired fingerprints into the revocation list
    pub async fn load_revoked(&self) -> Result<usize> {
        let revoked: Vec<(String, i64)> = sqlx::query_as(
            "SELECT fingerprint, expires_at FROM sessions WHERE is_revoked = 1 AND expires_at > ?",
        )
        .bind(Utc::now().timestamp())
        .fetch_all(&self.db)
        .await?;

        let count = revoked.len();
        self.revocations.revoke_all(with_expiry(revoked));
        Ok(count)
    }
}

fn with_expiry(rows: Vec<(String, i64)>) -> Vec<(String, DateTime<Utc>)> {
    rows.into_iter()
        .filter_map(|(fingerprint, ts)| {
            DateTime::from_timestamp(ts, 0).map(|expires_at| (fingerprint, expires_at))
        })
        .collect()
}
