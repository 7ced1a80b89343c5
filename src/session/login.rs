//! Login collaborator seam
//!
//! The browser-driven login itself lives outside this crate. Anything that can
//! produce a [`Credential`] implements [`LoginProvider`]; the
//! [`SessionManager`] only calls it when the stored credential is unusable.

use crate::session::{Credential, CredentialStore, SessionError, SessionResult};
use async_trait::async_trait;

/// Produces a fresh credential, typically by driving a browser login
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn perform_login(&self) -> SessionResult<Credential>;
}

/// Login provider fed with a token and cookie string obtained elsewhere
///
/// Used by the command line, where the operator pastes what the browser
/// login produced.
#[derive(Debug, Clone)]
pub struct StaticLogin {
    token: String,
    cookie_header: String,
    user_agent: Option<String>,
}

impl StaticLogin {
    pub fn new(token: impl Into<String>, cookie_header: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cookie_header: cookie_header.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[async_trait]
impl LoginProvider for StaticLogin {
    async fn perform_login(&self) -> SessionResult<Credential> {
        if self.token.trim().is_empty() {
            return Err(SessionError::LoginFailed("token is empty".to_string()));
        }

        let mut credential = Credential::from_cookie_header(self.token.trim(), &self.cookie_header);
        if credential.cookies.is_empty() {
            return Err(SessionError::LoginFailed(
                "cookie string contains no cookies".to_string(),
            ));
        }

        if let Some(user_agent) = &self.user_agent {
            credential = credential.with_header("user-agent", user_agent.clone());
        }

        Ok(credential)
    }
}

/// Couples the credential store with a login provider
pub struct SessionManager<P> {
    store: CredentialStore,
    provider: P,
}

impl<P: LoginProvider> SessionManager<P> {
    pub fn new(store: CredentialStore, provider: P) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns a usable credential, logging in again only when needed
    pub async fn ensure_session(&self) -> SessionResult<Credential> {
        match self.store.load_valid() {
            Ok(credential) => {
                tracing::debug!("Reusing stored session credential");
                Ok(credential)
            }
            Err(SessionError::Expired(reason)) => {
                tracing::info!("Stored session unusable ({}), logging in", reason);
                let credential = self.provider.perform_login().await?;
                if !self.store.is_valid(&credential) {
                    return Err(SessionError::LoginFailed(
                        "login produced an already expired credential".to_string(),
                    ));
                }
                self.store.save(&credential)?;
                Ok(credential)
            }
            Err(e) => Err(e),
        }
    }
}
