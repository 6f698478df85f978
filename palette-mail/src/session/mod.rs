//! Sessions: signed identity tokens, the `token` cookie and revocation

pub mod cookie;
pub mod guard;
pub mod manager;
pub mod revocation;

pub use cookie::{token_from_headers, TOKEN_COOKIE};
pub use guard::{IdentityPayload, SessionGuard, Subject, Unauthenticated, TOKEN_LIFETIME_SECS};
pub use manager::{ClientInfo, SessionInfo, SessionManager};
pub use revocation::{token_fingerprint, RevocationList, RevocationLookup};
