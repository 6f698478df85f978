//! palette-mail: template-driven email sending service
//!
//! # Features
//!
//! - **Sessions**: HS256 identity tokens in an HttpOnly `token` cookie, with
//!   per-session revocation
//! - **Templates**: `{{variable}}` substitution for subject and HTML, built-in
//!   templates, and variable discovery for visual-builder blocks
//! - **Delivery**: SMTP sending with history and in-app notifications
//! - **Security**: Argon2 password hashing and optional TOTP two-factor login
//!
//! # Example
//!
//! ```
//! use palette_mail::templates::{Bindings, TemplateCompiler};
//!
//! let mut bindings = Bindings::new();
//! bindings.insert("name".to_string(), "Ann".to_string());
//!
//! assert_eq!(
//!     TemplateCompiler::compile("Hello {{name}}, {{greeting}}", &bindings),
//!     "Hello Ann, [greeting]"
//! );
//! ```

pub mod accounts;
pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod mfa;
pub mod session;
pub mod templates;

pub use config::Config;
pub use error::{PaletteError, Result};
