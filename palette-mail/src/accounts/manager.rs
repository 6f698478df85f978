//! User registration and password authentication
//!
//! Passwords are hashed with Argon2 before storage.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::User;
use crate::error::{PaletteError, Result};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct UserManager {
    db: SqlitePool,
}

impl UserManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize the users table
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT,
                password_changed_at TEXT
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        // Databases created before password changes were tracked
        let tracked: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'password_changed_at'",
        )
        .fetch_one(&self.db)
        .await?;
        if tracked == 0 {
            sqlx::query("ALTER TABLE users ADD COLUMN password_changed_at TEXT")
                .execute(&self.db)
                .await?;
        }

        Ok(())
    }

    /// Create an account; the email must not be taken
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() {
            return Err(PaletteError::Validation("Name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(PaletteError::Validation("A valid email is required".to_string()));
        }
        validate_password(password)?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(&email)
            .fetch_one(&self.db)
            .await?;
        if exists > 0 {
            return Err(PaletteError::Conflict("User already exists".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(hash_password(password)?)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        info!("User registered: {}", user.email);
        Ok(user)
    }

    /// Check credentials. `None` for an unknown email or a wrong password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        debug!("Authentication attempt for {}", email);

        let row = sqlx::query(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            warn!("Authentication failed: user not found: {}", email);
            return Ok(None);
        };

        let stored_hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &stored_hash)? {
            warn!("Authentication failed: wrong password for {}", email);
            return Ok(None);
        }

        let user = row_to_user(&row)?;
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&user.id)
            .execute(&self.db)
            .await?;

        info!("Authentication successful for {}", email);
        Ok(Some(user))
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn update_profile(&self, id: &str, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PaletteError::Validation("Name is required".to_string()));
        }

        let result = sqlx::query("UPDATE users SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PaletteError::NotFound("User not found".to_string()));
        }

        self.get(id)
            .await?
            .ok_or_else(|| PaletteError::NotFound("User not found".to_string()))
    }

    /// Replace the password after checking the current one
    pub async fn change_password(&self, id: &str, current: &str, new: &str) -> Result<()> {
        let stored_hash: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        let stored_hash =
            stored_hash.ok_or_else(|| PaletteError::NotFound("User not found".to_string()))?;

        if !verify_password(current, &stored_hash)? {
            return Err(PaletteError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(new)?;

        sqlx::query("UPDATE users SET password_hash = ?, password_changed_at = ? WHERE id = ?")
            .bind(hash_password(new)?)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;

        info!("Password changed for user {}", id);
        Ok(())
    }

    /// When the password was last changed; `None` if it never was
    pub async fn last_password_change(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        let changed_at: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_changed_at FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

        let changed_at =
            changed_at.ok_or_else(|| PaletteError::NotFound("User not found".to_string()))?;

        changed_at
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| PaletteError::Parse(format!("Invalid password_changed_at: {}", e)))
            })
            .transpose()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PaletteError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PaletteError::PasswordHash(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| PaletteError::PasswordHash(format!("Invalid stored hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| PaletteError::Parse(format!("Invalid created_at: {}", e)))?
            .with_timezone(&Utc),
    })
}
