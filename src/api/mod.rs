//! Counterparty API of the public platform
//!
//! The crawl engine consumes three logical operations through the
//! [`WechatApi`] trait. Every call takes the session credential explicitly;
//! implementations attach the token and cookies from it.

mod client;
mod types;

pub use client::{build_http_client, extract_article_text, MpClient};
pub use types::{
    AccountCandidate, AppMsgItem, AppMsgResponse, ArticleSummary, BaseResp, BizItem,
    SearchBizResponse, RET_FREQ_CONTROL, RET_SESSION_INVALID,
};

use crate::session::Credential;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the counterparty API
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 429 or a "frequency limited" payload
    #[error("Throttled by counterparty: {0}")]
    Throttled(String),

    /// The token or cookies were rejected
    #[error("Session rejected by counterparty: {0}")]
    SessionInvalid(String),

    #[error("HTTP status {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("API returned ret={ret}: {message}")]
    Api { ret: i64, message: String },

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// The operations the crawl engine needs from the platform
#[async_trait]
pub trait WechatApi: Send + Sync {
    /// Searches public accounts by name
    async fn search_accounts(
        &self,
        session: &Credential,
        name: &str,
    ) -> ApiResult<Vec<AccountCandidate>>;

    /// Lists one page of an account's history, newest first
    ///
    /// `page` is zero-based; an empty result means the history is exhausted.
    async fn list_articles(
        &self,
        session: &Credential,
        external_id: &str,
        page: u32,
        page_size: u32,
    ) -> ApiResult<Vec<ArticleSummary>>;

    /// Fetches the full body of one article
    async fn get_article_body(&self, session: &Credential, url: &str) -> ApiResult<String>;
}
