//! Two-factor persistence and login checks

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::info;

use super::totp::TotpService;
use super::types::{TwoFactorSetup, TwoFactorStatus};
use crate::error::{PaletteError, Result};

/// Per-user TOTP secrets and enablement
#[derive(Clone)]
pub struct MfaManager {
    db: SqlitePool,
    totp: Arc<TotpService>,
}

impl MfaManager {
    pub fn new(db: SqlitePool, totp: TotpService) -> Self {
        Self {
            db,
            totp: Arc::new(totp),
        }
    }

    /// Initialize the two_factor table
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS two_factor (
                user_id TEXT PRIMARY KEY,
                secret TEXT,
                pending_secret TEXT,
                is_enabled INTEGER NOT NULL DEFAULT 0,
                enabled_at TEXT
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Generate a pending secret; 2FA stays off until `confirm`
    pub async fn start_setup(&self, user_id: &str, email: &str) -> Result<TwoFactorSetup> {
        let setup = self.totp.setup(email)?;

        sqlx::query(
            r#"
            INSERT INTO two_factor (user_id, pending_secret) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET pending_secret = excluded.pending_secret
            "#,
        )
        .bind(user_id)
        .bind(&setup.secret)
        .execute(&self.db)
        .await?;

        Ok(setup)
    }

    /// Enable 2FA if `code` matches the pending secret
    pub async fn confirm(&self, user_id: &str, code: &str) -> Result<()> {
        let pending = sqlx::query_scalar::<_, Option<String>>(
            "SELECT pending_secret FROM two_factor WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .flatten();

        let pending = pending
            .ok_or_else(|| PaletteError::TwoFactor("2FA setup not initialized".to_string()))?;

        if !self.totp.validate(&pending, code)? {
            return Err(PaletteError::TwoFactor("Invalid verification code".to_string()));
        }

        sqlx::query(
            r#"
            UPDATE two_factor
            SET secret = pending_secret, pending_secret = NULL, is_enabled = 1, enabled_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&self.db)
        .await?;

        info!("Two-factor authentication enabled for user {}", user_id);
        Ok(())
    }

    /// Turn 2FA off; requires a current code while it is enabled
    pub async fn disable(&self, user_id: &str, code: &str) -> Result<()> {
        if self.is_enabled(user_id).await? {
            self.check_code(user_id, Some(code)).await?;
        }

        sqlx::query("DELETE FROM two_factor WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        info!("Two-factor authentication disabled for user {}", user_id);
        Ok(())
    }

    pub async fn is_enabled(&self, user_id: &str) -> Result<bool> {
        Ok(self.status(user_id).await?.enabled)
    }

    pub async fn status(&self, user_id: &str) -> Result<TwoFactorStatus> {
        let row = sqlx::query(
            "SELECT pending_secret, is_enabled, enabled_at FROM two_factor WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(TwoFactorStatus::default());
        };

        let pending: Option<String> = row.try_get("pending_secret")?;
        let enabled_at: Option<String> = row.try_get("enabled_at")?;

        Ok(TwoFactorStatus {
            enabled: row.try_get("is_enabled")?,
            pending_setup: pending.is_some(),
            enabled_at: enabled_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
        })
    }

    /// Login gate: passes when 2FA is off, otherwise requires a valid code
    pub async fn check_code(&self, user_id: &str, code: Option<&str>) -> Result<()> {
        let secret = sqlx::query_scalar::<_, Option<String>>(
            "SELECT secret FROM two_factor WHERE user_id = ? AND is_enabled = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .flatten();

        let Some(secret) = secret else {
            return Ok(());
        };

        let code = code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PaletteError::TwoFactor("Two-factor code required".to_string()))?;

        if self.totp.validate(&secret, code)? {
            Ok(())
        } else {
            Err(PaletteError::TwoFactor("Invalid two-factor code".to_string()))
        }
    }
}
