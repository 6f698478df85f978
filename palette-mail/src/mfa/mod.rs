//! Two-factor authentication
//!
//! TOTP codes (RFC 6238) checked at login once a user has confirmed setup.

pub mod manager;
pub mod totp;
pub mod types;

pub use manager::MfaManager;
pub use totp::TotpService;
pub use types::{TwoFactorSetup, TwoFactorStatus};
