//! Session guard: issues and verifies signed identity tokens
//!
//! Tokens are HS256 JWTs valid for seven days. Verification never reports why a
//! token was rejected; the reason is only logged at debug level.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::Result;
use crate::session::cookie::set_token_cookie;
use crate::session::revocation::{token_fingerprint, RevocationLookup};

/// Token validity window in seconds (7 days)
pub const TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

/// Who a token is issued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

/// Verified identity carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityPayload {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Wire claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    name: String,
    iat: i64,
    exp: i64,
    /// Token id, keeps session fingerprints unique
    jti: String,
}

/// The single outcome for every verification failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Not authenticated")]
pub struct Unauthenticated;

/// Diagnostic-only rejection cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    Malformed,
    BadSignature,
    Expired,
    Revoked,
}

/// Issues and checks session tokens
pub struct SessionGuard {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    secure_cookies: bool,
}

impl SessionGuard {
    /// Build a guard from the auth configuration.
    ///
    /// Fails when no signing secret is configured; callers must not serve
    /// traffic in that case.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config.signing_secret()?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `verify_at`
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            secure_cookies: config.secure_cookies(),
        })
    }

    /// Issue a token for `subject`, valid from now for seven days
    pub fn issue(&self, subject: &Subject) -> Result<String> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: &Subject, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.id.clone(),
            email: subject.email.clone(),
            name: subject.display_name.clone(),
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify a token against the current time
    pub fn verify(&self, token: &str) -> std::result::Result<IdentityPayload, Unauthenticated> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`. A token is expired at exactly `expires_at`.
    pub fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<IdentityPayload, Unauthenticated> {
        self.check(token, now).map_err(|reason| {
            debug!(?reason, "Token rejected");
            Unauthenticated
        })
    }

    fn check(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<IdentityPayload, RejectReason> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => RejectReason::BadSignature,
                _ => RejectReason::Malformed,
            }
        })?;
        let claims = data.claims;

        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(RejectReason::Malformed)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(RejectReason::Malformed)?;

        if now.timestamp() >= claims.exp {
            return Err(RejectReason::Expired);
        }

        Ok(IdentityPayload {
            subject_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            issued_at,
            expires_at,
        })
    }

    /// Ask the injected lookup whether `token` was revoked
    pub fn is_revoked<L>(&self, token: &str, lookup: &L) -> bool
    where
        L: RevocationLookup + ?Sized,
    {
        lookup.is_revoked(&token_fingerprint(token))
    }

    /// Verify and check revocation, collapsing every failure
    pub fn authenticate<L>(
        &self,
        token: &str,
        lookup: &L,
    ) -> std::result::Result<IdentityPayload, Unauthenticated>
    where
        L: RevocationLookup + ?Sized,
    {
        let identity = self.verify(token)?;
        if self.is_revoked(token, lookup) {
            debug!(reason = ?RejectReason::Revoked, "Token rejected");
            return Err(Unauthenticated);
        }
        Ok(identity)
    }

    /// Set the session cookie on an outgoing response
    pub fn attach_to_response(&self, headers: &mut HeaderMap, token: &str) {
        set_token_cookie(headers, token, TOKEN_LIFETIME_SECS, self.secure_cookies);
    }

    /// Expire the session cookie
    pub fn clear(&self, headers: &mut HeaderMap) {
        set_token_cookie(headers, "", 0, self.secure_cookies);
    }
}
