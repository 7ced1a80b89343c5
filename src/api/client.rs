//! HTTP implementation of the counterparty API
//!
//! This module handles:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Attaching the session token and cookies to every request
//! - Classifying throttling and session rejections from status codes and
//!   `base_resp` payloads
//! - Extracting the text body of an article page

use crate::api::types::{
    AccountCandidate, AppMsgResponse, ArticleSummary, BaseResp, SearchBizResponse,
    RET_FREQ_CONTROL, RET_SESSION_INVALID,
};
use crate::api::{ApiError, ApiResult, WechatApi};
use crate::config::ApiConfig;
use crate::session::Credential;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Client for the public platform's backend endpoints
#[derive(Debug, Clone)]
pub struct MpClient {
    client: Client,
    base_url: Url,
}

impl MpClient {
    /// Creates a client for the configured base URL
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = build_http_client(config)?;
        let base_url = Url::parse(&config.base_url)?;
        Ok(Self { client, base_url })
    }

    /// Checks remotely whether the platform still accepts the credential
    ///
    /// Issues a single one-result search, the cheapest authenticated call.
    pub async fn probe_session(&self, session: &Credential) -> ApiResult<bool> {
        let url = self.base_url.join("cgi-bin/searchbiz")?;
        let params = [
            ("action", "search_biz".to_string()),
            ("begin", "0".to_string()),
            ("count", "1".to_string()),
            ("query", "test".to_string()),
            ("token", session.token.clone()),
            ("lang", "zh_CN".to_string()),
            ("f", "json".to_string()),
            ("ajax", "1".to_string()),
        ];

        match self.get_json::<SearchBizResponse>(url, &params, session).await {
            Ok(_) => Ok(true),
            Err(ApiError::SessionInvalid(reason)) => {
                tracing::warn!("Session rejected: {}", reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn authorized(&self, builder: RequestBuilder, session: &Credential) -> RequestBuilder {
        let mut builder = builder;
        if !session.cookies.is_empty() {
            builder = builder.header(COOKIE, session.cookie_header());
        }
        for (name, value) in &session.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    async fn get_json<T>(
        &self,
        url: Url,
        params: &[(&str, String)],
        session: &Credential,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned + HasBaseResp,
    {
        let request = self.authorized(self.client.get(url.clone()).query(params), session);
        let response = request.send().await?;
        check_status(response.status(), url.as_str())?;

        let body = response.text().await?;
        let parsed: T = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{} (from {})", e, url.path())))?;
        check_base_resp(parsed.base_resp())?;
        Ok(parsed)
    }
}

#[async_trait]
impl WechatApi for MpClient {
    async fn search_accounts(
        &self,
        session: &Credential,
        name: &str,
    ) -> ApiResult<Vec<AccountCandidate>> {
        let url = self.base_url.join("cgi-bin/searchbiz")?;
        let params = [
            ("action", "search_biz".to_string()),
            ("scene", "1".to_string()),
            ("begin", "0".to_string()),
            ("count", "10".to_string()),
            ("query", name.to_string()),
            ("token", session.token.clone()),
            ("lang", "zh_CN".to_string()),
            ("f", "json".to_string()),
            ("ajax", "1".to_string()),
        ];

        let response: SearchBizResponse = self.get_json(url, &params, session).await?;
        tracing::debug!("Search for '{}' returned {} candidates", name, response.list.len());
        Ok(response.list.into_iter().map(AccountCandidate::from).collect())
    }

    async fn list_articles(
        &self,
        session: &Credential,
        external_id: &str,
        page: u32,
        page_size: u32,
    ) -> ApiResult<Vec<ArticleSummary>> {
        let url = self.base_url.join("cgi-bin/appmsg")?;
        let begin = page.saturating_mul(page_size);
        let params = [
            ("action", "list_ex".to_string()),
            ("begin", begin.to_string()),
            ("count", page_size.to_string()),
            ("fakeid", external_id.to_string()),
            ("type", "9".to_string()),
            ("query", String::new()),
            ("token", session.token.clone()),
            ("lang", "zh_CN".to_string()),
            ("f", "json".to_string()),
            ("ajax", "1".to_string()),
        ];

        let response: AppMsgResponse = self.get_json(url, &params, session).await?;
        let items = match response.app_msg_list {
            Some(items) => items,
            None => {
                tracing::warn!("No article list in response for {} at begin={}", external_id, begin);
                return Ok(Vec::new());
            }
        };

        items
            .into_iter()
            .map(|item| {
                let update_time = item.update_time;
                ArticleSummary::from_item(item).ok_or_else(|| {
                    ApiError::Decode(format!("invalid update_time {}", update_time))
                })
            })
            .collect()
    }

    async fn get_article_body(&self, session: &Credential, url: &str) -> ApiResult<String> {
        let parsed = Url::parse(url)?;
        let response = self.authorized(self.client.get(parsed), session).send().await?;
        check_status(response.status(), url)?;

        let html = response.text().await?;
        Ok(extract_article_text(&html))
    }
}

/// Implemented by every JSON response carrying a `base_resp` block
trait HasBaseResp {
    fn base_resp(&self) -> &BaseResp;
}

impl HasBaseResp for SearchBizResponse {
    fn base_resp(&self) -> &BaseResp {
        &self.base_resp
    }
}

impl HasBaseResp for AppMsgResponse {
    fn base_resp(&self) -> &BaseResp {
        &self.base_resp
    }
}

fn check_status(status: StatusCode, url: &str) -> ApiResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::Throttled(format!("HTTP 429 from {}", url)));
    }
    if !status.is_success() {
        return Err(ApiError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Maps a `base_resp` return code onto the error taxonomy
fn check_base_resp(resp: &BaseResp) -> ApiResult<()> {
    match resp.ret {
        0 => Ok(()),
        RET_FREQ_CONTROL => Err(ApiError::Throttled(format!(
            "ret={} {}",
            resp.ret, resp.err_msg
        ))),
        ret if RET_SESSION_INVALID.contains(&ret) => Err(ApiError::SessionInvalid(format!(
            "ret={} {}",
            ret, resp.err_msg
        ))),
        ret => Err(ApiError::Api {
            ret,
            message: resp.err_msg.clone(),
        }),
    }
}

/// Extracts the readable text of an article page
///
/// Returns an empty string when the page has no article body element
/// (deleted or restricted articles).
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("#js_content, .rich_media_content") {
        Ok(selector) => selector,
        Err(_) => return String::new(),
    };

    let Some(body) = document.select(&selector).next() else {
        return String::new();
    };

    body.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
