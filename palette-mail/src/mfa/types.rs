//! Two-factor types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Returned when a user starts two-factor setup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetup {
    /// Base32 secret for manual entry
    pub secret: String,
    /// QR code as data URI (base64 PNG)
    pub qr_code: String,
    /// `otpauth://` URI for authenticator apps
    pub provisioning_uri: String,
}

/// Two-factor state of a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub pending_setup: bool,
    pub enabled_at: Option<DateTime<Utc>>,
}
