//! REST API
//!
//! Protected handlers take a [`CurrentUser`], which authenticates the
//! `token` cookie before the handler runs.

pub mod auth;
pub mod email;
pub mod extract;
pub mod notifications;
pub mod server;
pub mod state;
pub mod templates;
pub mod user;

pub use extract::CurrentUser;
pub use server::{router, serve};
pub use state::AppState;
