use crate::error::{PaletteError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix, e.g. `PALETTEMAIL_AUTH__JWT_SECRET`
const ENV_PREFIX: &str = "PALETTEMAIL";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub mfa: MfaConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Public URL, exposed to templates as `{{baseUrl}}`
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MfaConfig {
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://palettemail.db?mode=rwc".to_string(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            sender_name: "PaletteMail".to_string(),
        }
    }
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "PaletteMail".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AuthConfig {
    /// The token signing secret. A missing or blank secret is fatal.
    pub fn signing_secret(&self) -> Result<&str> {
        match self.jwt_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(PaletteError::Config(
                "auth.jwt_secret is not set (PALETTEMAIL_AUTH__JWT_SECRET)".to_string(),
            )),
        }
    }

    /// Cookies carry `Secure` only in production
    pub fn secure_cookies(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl SmtpConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from an optional file, overridden by environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PaletteError::Config(e.to_string()))
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml(content: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PaletteError::Config(e.to_string()))
    }
}
