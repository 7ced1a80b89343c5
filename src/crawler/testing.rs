//! Scripted counterparty for crawl engine tests

use crate::api::{AccountCandidate, ApiError, ApiResult, ArticleSummary, WechatApi};
use crate::session::Credential;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct ScriptedApi {
    accounts: HashMap<String, String>,
    pages: HashMap<String, Vec<Vec<ArticleSummary>>>,
    failing_pages: HashMap<String, u32>,
    session_rejected: HashSet<String>,
    failing_bodies: HashSet<String>,
    panicking: HashSet<String>,
    cancel_after: HashMap<String, (u32, CancellationToken)>,
    throttles_left: Mutex<u32>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account whose history is `pages`, newest first
    pub fn with_account(mut self, name: &str, pages: Vec<Vec<ArticleSummary>>) -> Self {
        let external_id = format!("id-{}", name);
        self.accounts.insert(name.to_string(), external_id.clone());
        self.pages.insert(external_id, pages);
        self
    }

    /// Makes page `page` of the account fail with an HTTP 500
    pub fn failing_page(mut self, name: &str, page: u32) -> Self {
        self.failing_pages.insert(format!("id-{}", name), page);
        self
    }

    pub fn rejecting_session_for(mut self, name: &str) -> Self {
        self.session_rejected.insert(format!("id-{}", name));
        self
    }

    pub fn failing_body(mut self, url: &str) -> Self {
        self.failing_bodies.insert(url.to_string());
        self
    }

    /// Makes every list call of the account panic
    pub fn panicking_for(mut self, name: &str) -> Self {
        self.panicking.insert(format!("id-{}", name));
        self
    }

    /// Cancels `token` while serving page `page` of the account
    pub fn cancelling_after(mut self, name: &str, page: u32, token: CancellationToken) -> Self {
        self.cancel_after.insert(format!("id-{}", name), (page, token));
        self
    }

    /// Throttles the next `n` list calls
    pub fn throttling(self, n: u32) -> Self {
        *self.throttles_left.lock().unwrap() = n;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self, name: &str) -> Vec<u32> {
        let prefix = format!("list:id-{}:", name);
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).and_then(|p| p.parse().ok()))
            .collect()
    }
}

/// Builds an article summary published at `publish_time`
pub(crate) fn summary(url: &str, publish_time: DateTime<Utc>) -> ArticleSummary {
    ArticleSummary {
        aid: url.rsplit('/').next().unwrap_or(url).to_string(),
        title: format!("Article {}", url),
        url: url.to_string(),
        publish_time,
        digest: String::new(),
        cover: String::new(),
    }
}

/// Builds pages of `per_page` articles, one hour apart, newest first
pub(crate) fn history(
    name: &str,
    newest: DateTime<Utc>,
    pages: usize,
    per_page: usize,
) -> Vec<Vec<ArticleSummary>> {
    (0..pages)
        .map(|p| {
            (0..per_page)
                .map(|i| {
                    let n = p * per_page + i;
                    summary(
                        &format!("https://mp.weixin.qq.com/s/{}-{}", name, n),
                        newest - chrono::Duration::hours(n as i64),
                    )
                })
                .collect()
        })
        .collect()
}

pub(crate) fn credential() -> Credential {
    Credential::from_cookie_header("token-1", "slave_sid=abc; data_ticket=xyz")
}

pub(crate) fn at(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).unwrap()
}

#[async_trait]
impl WechatApi for ScriptedApi {
    async fn search_accounts(
        &self,
        _session: &Credential,
        name: &str,
    ) -> ApiResult<Vec<AccountCandidate>> {
        self.calls.lock().unwrap().push(format!("search:{}", name));
        Ok(self
            .accounts
            .get(name)
            .map(|id| {
                vec![AccountCandidate {
                    external_id: id.clone(),
                    nickname: name.to_string(),
                    alias: String::new(),
                    signature: String::new(),
                    avatar: String::new(),
                }]
            })
            .unwrap_or_default())
    }

    async fn list_articles(
        &self,
        _session: &Credential,
        external_id: &str,
        page: u32,
        _page_size: u32,
    ) -> ApiResult<Vec<ArticleSummary>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("list:{}:{}", external_id, page));

        if self.panicking.contains(external_id) {
            panic!("scripted panic listing {}", external_id);
        }
        if let Some((after, token)) = self.cancel_after.get(external_id) {
            if *after == page {
                token.cancel();
            }
        }

        {
            let mut throttles = self.throttles_left.lock().unwrap();
            if *throttles > 0 {
                *throttles -= 1;
                return Err(ApiError::Throttled("ret=200013 freq control".to_string()));
            }
        }
        if self.session_rejected.contains(external_id) {
            return Err(ApiError::SessionInvalid("ret=200003 invalid session".to_string()));
        }
        if self.failing_pages.get(external_id) == Some(&page) {
            return Err(ApiError::Http {
                status: 500,
                url: format!("appmsg?fakeid={}", external_id),
            });
        }

        Ok(self
            .pages
            .get(external_id)
            .and_then(|pages| pages.get(page as usize))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_article_body(&self, _session: &Credential, url: &str) -> ApiResult<String> {
        self.calls.lock().unwrap().push(format!("body:{}", url));
        if self.failing_bodies.contains(url) {
            return Err(ApiError::Http {
                status: 404,
                url: url.to_string(),
            });
        }
        Ok(format!("Body of {}", url))
    }
}
