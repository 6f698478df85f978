//! User accounts and password credentials

pub mod manager;
pub mod types;

pub use manager::UserManager;
pub use types::{ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, User};
