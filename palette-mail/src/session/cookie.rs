//! The `token` cookie carrying the signed session token

use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use tracing::warn;

/// Cookie name
pub const TOKEN_COOKIE: &str = "token";

/// Replace any `token` cookie already queued on the response with a new one.
///
/// Other `Set-Cookie` headers are left untouched, so calling this twice yields
/// the same final header set.
pub fn set_token_cookie(headers: &mut HeaderMap, value: &str, max_age: i64, secure: bool) {
    let mut cookie = format!(
        "{TOKEN_COOKIE}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }

    let cookie = match HeaderValue::from_str(&cookie) {
        Ok(cookie) => cookie,
        Err(e) => {
            warn!("Refusing to set malformed session cookie: {}", e);
            return;
        }
    };

    let prefix = format!("{TOKEN_COOKIE}=");
    let others: Vec<HeaderValue> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
        .cloned()
        .collect();

    headers.remove(SET_COOKIE);
    for other in others {
        headers.append(SET_COOKIE, other);
    }
    headers.append(SET_COOKIE, cookie);
}

/// Extract the session token from the `token` cookie, falling back to a
/// `Bearer` authorization header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(cookies) = header.to_str() else {
            continue;
        };
        for cookie in cookies.split(';') {
            if let Some((name, value)) = cookie.trim().split_once('=') {
                if name == TOKEN_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
