//! Session credential handling
//!
//! This module provides:
//! - `Credential`: the token and cookie bundle authorizing API calls
//! - `CredentialStore`: atomic on-disk persistence with a TTL check
//! - `LoginProvider` / `SessionManager`: the seam to the external login flow

mod credential;
mod login;
mod store;

pub use credential::{parse_cookie_header, Credential};
pub use login::{LoginProvider, SessionManager, StaticLogin};
pub use store::CredentialStore;

use thiserror::Error;

/// Errors raised while loading, validating or refreshing a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session expired: {0}")]
    Expired(String),

    #[error("Credential file is malformed: {0}")]
    Malformed(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
