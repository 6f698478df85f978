//! TOTP (Time-based One-Time Password) service
//!
//! SHA1, six digits, 30 second steps, one step of skew either way.

use totp_rs::{Algorithm, Secret, TOTP};

use super::types::TwoFactorSetup;
use crate::error::{PaletteError, Result};

/// TOTP parameters
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps
    pub issuer: String,
    pub digits: usize,
    /// Time step in seconds
    pub step: u64,
    pub algorithm: Algorithm,
}

impl TotpConfig {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            digits: 6,
            step: 30,
            algorithm: Algorithm::SHA1,
        }
    }
}

/// Generates secrets and checks codes
pub struct TotpService {
    config: TotpConfig,
}

impl TotpService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            config: TotpConfig::new(issuer),
        }
    }

    pub fn with_config(config: TotpConfig) -> Self {
        Self { config }
    }

    /// A fresh base32 secret
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| PaletteError::TwoFactor(format!("Invalid secret: {:?}", e)))?;

        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            1,
            self.config.step,
            bytes,
            Some(self.config.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| PaletteError::TwoFactor(format!("Failed to create TOTP: {:?}", e)))
    }

    /// New secret with QR code and provisioning URI for `email`
    pub fn setup(&self, email: &str) -> Result<TwoFactorSetup> {
        let secret = self.generate_secret();
        let totp = self.totp(&secret, email)?;

        let qr_code = totp
            .get_qr_base64()
            .map_err(|e| PaletteError::TwoFactor(format!("Failed to generate QR code: {}", e)))?;

        Ok(TwoFactorSetup {
            provisioning_uri: totp.get_url(),
            qr_code: format!("data:image/png;base64,{}", qr_code),
            secret,
        })
    }

    /// Check a code against a secret at the current time
    pub fn validate(&self, secret_base32: &str, code: &str) -> Result<bool> {
        let totp = self.totp(secret_base32, "")?;
        Ok(totp.check_current(code.trim()).unwrap_or(false))
    }

    #[cfg(test)]
    pub fn generate_current(&self, secret_base32: &str) -> Result<String> {
        self.totp(secret_base32, "")?
            .generate_current()
            .map_err(|e| PaletteError::TwoFactor(format!("Failed to generate code: {}", e)))
    }
}
