//! Paginated history walk of a single account
//!
//! This module handles:
//! - Resolving an account name to its platform id
//! - Fetching history pages one at a time through the rate gate
//! - Applying the date cutoff and the natural stop conditions
//! - Storing new articles through the dedup filter, optionally with bodies
//! - Persisting a checkpoint after every page so a walk can resume

use crate::api::{AccountCandidate, ApiError, ApiResult, ArticleSummary, WechatApi};
use crate::config::Config;
use crate::crawler::dedup::{is_stored, store_if_new, StoreOutcome};
use crate::crawler::gate::RateGate;
use crate::crawler::{with_storage, CrawlError, SharedStorage};
use crate::session::Credential;
use crate::state::{CrawlCheckpoint, Outcome, StopReason, WalkState};
use crate::storage::{NewArticle, PLATFORM_WECHAT};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-walk limits
#[derive(Debug, Clone)]
pub struct WalkSettings {
    /// Upper bound on pages, counting pages completed before a resume
    pub max_pages: u32,

    /// Only keep articles from the last `days` days; 0 disables the cutoff
    pub days: u32,

    pub include_content: bool,
    pub page_size: u32,
    pub content_timeout: Duration,

    /// Retries of one throttled call before giving up
    pub max_throttle_retries: u32,
}

impl WalkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.crawl.max_pages,
            days: config.crawl.days,
            include_content: config.crawl.include_content,
            page_size: config.crawl.page_size,
            content_timeout: Duration::from_secs(config.crawl.content_timeout_secs),
            max_throttle_retries: config.gate.max_throttle_retries,
        }
    }

    /// Earliest publish time a walk started at `now` keeps
    ///
    /// A window reaching past the earliest representable date keeps
    /// everything, same as no cutoff.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.days == 0 {
            return None;
        }
        chrono::Duration::try_days(i64::from(self.days)).and_then(|window| now.checked_sub_signed(window))
    }
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One article whose body could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFailure {
    pub url: String,
    pub reason: String,
}

/// Everything a finished walk reports
#[derive(Debug)]
pub struct WalkReport {
    pub account: String,
    pub external_id: Option<String>,
    pub final_state: WalkState,
    pub outcome: Outcome,
    pub stop_reason: Option<StopReason>,

    /// Page index the walk resumed at, if a checkpoint was found
    pub resumed_from_page: Option<u32>,

    pub pages_fetched: u32,
    pub articles_seen: u32,
    pub articles_stored: u32,
    pub articles_skipped: u32,
    pub articles_too_old: u32,
    pub content_failures: Vec<ContentFailure>,
    pub error: Option<CrawlError>,
}

impl WalkReport {
    fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            external_id: None,
            final_state: WalkState::Init,
            outcome: Outcome::Aborted,
            stop_reason: None,
            resumed_from_page: None,
            pages_fetched: 0,
            articles_seen: 0,
            articles_stored: 0,
            articles_skipped: 0,
            articles_too_old: 0,
            content_failures: Vec::new(),
            error: None,
        }
    }

    /// Report of a walk that ended without running to completion
    pub(crate) fn aborted(account: &str, error: CrawlError) -> Self {
        let mut report = Self::new(account);
        report.final_state = WalkState::Done(Outcome::Aborted);
        report.stop_reason = Some(StopReason::Failed);
        report.error = Some(error);
        report
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Walks account histories against one gate, credential and store
pub struct AccountWalker<'a> {
    api: &'a dyn WechatApi,
    gate: &'a RateGate,
    storage: &'a SharedStorage,
    credential: &'a Credential,
    settings: &'a WalkSettings,
    cancel: &'a CancellationToken,
}

impl<'a> AccountWalker<'a> {
    pub fn new(
        api: &'a dyn WechatApi,
        gate: &'a RateGate,
        storage: &'a SharedStorage,
        credential: &'a Credential,
        settings: &'a WalkSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            api,
            gate,
            storage,
            credential,
            settings,
            cancel,
        }
    }

    /// Walks one account's history
    ///
    /// Never fails: every error ends the walk in `Done(Aborted)` and is
    /// carried in the report.
    pub async fn walk(&self, account: &str) -> WalkReport {
        self.walk_at(account, Utc::now()).await
    }

    /// Walks one account's history with the date cutoff computed from `now`
    pub async fn walk_at(&self, account: &str, now: DateTime<Utc>) -> WalkReport {
        let mut report = WalkReport::new(account);
        let mut state = WalkState::Init;
        let mut checkpoint = None;

        let result = self
            .run(account, now, &mut state, &mut checkpoint, &mut report)
            .await;

        let reason = match result {
            Ok(reason) => reason,
            Err(CrawlError::Cancelled) => {
                report.error = Some(CrawlError::Cancelled);
                StopReason::Cancelled
            }
            Err(err) => {
                tracing::warn!(account = %account, error = %err, "Walk aborted");
                report.error = Some(err);
                StopReason::Failed
            }
        };

        let outcome = reason.outcome();
        let done = WalkState::Done(outcome);
        if !state.can_transition_to(done) {
            tracing::error!(account = %account, "Walk ended from {}", state);
        }
        report.final_state = done;
        report.outcome = outcome;
        report.stop_reason = Some(reason);

        if let Some(mut checkpoint) = checkpoint {
            self.settle_checkpoint(&mut checkpoint, reason);
        }

        tracing::info!(
            account = %account,
            outcome = %outcome,
            stop_reason = %reason,
            pages = report.pages_fetched,
            stored = report.articles_stored,
            skipped = report.articles_skipped,
            "Walk finished"
        );
        report
    }

    async fn run(
        &self,
        account: &str,
        now: DateTime<Utc>,
        state: &mut WalkState,
        checkpoint_slot: &mut Option<CrawlCheckpoint>,
        report: &mut WalkReport,
    ) -> Result<StopReason, CrawlError> {
        if account.trim().is_empty() {
            return Err(CrawlError::InvalidInput("empty account name".to_string()));
        }
        if self.settings.max_pages == 0 {
            return Err(CrawlError::InvalidInput("max_pages must be at least 1".to_string()));
        }
        if self.settings.page_size == 0 {
            return Err(CrawlError::InvalidInput("page_size must be at least 1".to_string()));
        }
        let cutoff = self.settings.cutoff(now);
        self.check_cancelled()?;

        let (account_id, external_id) = self.resolve_account(account).await?;
        report.external_id = Some(external_id.clone());

        let checkpoint = checkpoint_slot.insert(self.start_checkpoint(account, &external_id)?);
        if checkpoint.pages_completed > 0 {
            report.resumed_from_page = Some(checkpoint.next_page());
        }

        loop {
            if checkpoint.pages_completed >= self.settings.max_pages {
                return Ok(StopReason::MaxPages);
            }
            self.check_cancelled()?;

            advance(state, WalkState::FetchingPage)?;
            let page = checkpoint.next_page();
            let articles = self.fetch_page(&external_id, page).await?;
            report.pages_fetched += 1;

            if articles.is_empty() {
                tracing::debug!(account = %account, page, "History exhausted");
                return Ok(StopReason::Exhausted);
            }

            advance(state, WalkState::Filtering)?;
            report.articles_seen += articles.len() as u32;
            let oldest = articles.iter().map(|a| a.publish_time).min();
            let (retained, too_old) = partition_by_cutoff(articles, cutoff);
            report.articles_too_old += too_old;

            for summary in retained {
                self.archive(account_id, summary, report).await?;
            }

            checkpoint.record_page(oldest);
            with_storage(self.storage, |s| s.save_checkpoint(checkpoint))?;

            if too_old > 0 {
                tracing::debug!(account = %account, page, "Reached date cutoff");
                return Ok(StopReason::DateCutoff);
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), CrawlError> {
        if self.cancel.is_cancelled() {
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves the account to its storage id and platform id
    ///
    /// A previously stored account is reused without a remote search.
    async fn resolve_account(&self, account: &str) -> Result<(i64, String), CrawlError> {
        if let Some(stored) = with_storage(self.storage, |s| s.get_account(PLATFORM_WECHAT, account))? {
            tracing::debug!(account = %account, external_id = %stored.external_id, "Using stored account");
            return Ok((stored.id, stored.external_id));
        }

        let candidates = self
            .gated(
                || self.api.search_accounts(self.credential, account),
                |e| CrawlError::SearchFailed(e.to_string()),
            )
            .await?;

        let candidate = pick_candidate(account, candidates)
            .ok_or_else(|| CrawlError::AccountNotFound(account.to_string()))?;
        let details = serde_json::to_value(&candidate).unwrap_or(serde_json::Value::Null);

        let account_id = with_storage(self.storage, |s| {
            s.upsert_account(PLATFORM_WECHAT, account, &candidate.external_id, &details)
        })?;
        tracing::info!(account = %account, external_id = %candidate.external_id, "Resolved account");
        Ok((account_id, candidate.external_id))
    }

    fn start_checkpoint(
        &self,
        account: &str,
        external_id: &str,
    ) -> Result<CrawlCheckpoint, CrawlError> {
        let previous = with_storage(self.storage, |s| s.load_checkpoint(PLATFORM_WECHAT, account))?;

        let checkpoint = match previous {
            Some(mut previous)
                if previous.is_resumable()
                    && previous.external_id.as_deref() == Some(external_id) =>
            {
                tracing::info!(
                    account = %account,
                    page = previous.next_page(),
                    "Resuming walk from checkpoint"
                );
                previous.stop_reason = None;
                previous
            }
            _ => {
                let mut fresh = CrawlCheckpoint::new(PLATFORM_WECHAT, account);
                fresh.external_id = Some(external_id.to_string());
                fresh
            }
        };
        Ok(checkpoint)
    }

    /// Persists the checkpoint for a resumable stop or removes it after success
    fn settle_checkpoint(&self, checkpoint: &mut CrawlCheckpoint, reason: StopReason) {
        let result = if reason.outcome().is_success() {
            with_storage(self.storage, |s| {
                s.clear_checkpoint(&checkpoint.platform, &checkpoint.account)
            })
        } else {
            checkpoint.finish(reason);
            with_storage(self.storage, |s| s.save_checkpoint(checkpoint))
        };

        if let Err(e) = result {
            tracing::warn!(account = %checkpoint.account, "Failed to update checkpoint: {}", e);
        }
    }

    async fn fetch_page(
        &self,
        external_id: &str,
        page: u32,
    ) -> Result<Vec<ArticleSummary>, CrawlError> {
        self.gated(
            || {
                self.api
                    .list_articles(self.credential, external_id, page, self.settings.page_size)
            },
            |e| CrawlError::PageFetchFailed {
                page,
                reason: e.to_string(),
            },
        )
        .await
    }

    /// Stores one retained article unless it is already archived
    async fn archive(
        &self,
        account_id: i64,
        summary: ArticleSummary,
        report: &mut WalkReport,
    ) -> Result<(), CrawlError> {
        // Checked before the body fetch so known articles cost no request
        if is_stored(self.storage, &summary.url)? {
            report.articles_skipped += 1;
            return Ok(());
        }

        let mut details = summary.details();
        let content = if self.settings.include_content {
            match self.fetch_content(&summary.url).await {
                Ok(body) => Some(body),
                Err(CrawlError::ArticleContentFailed { url, reason }) => {
                    tracing::warn!(url = %url, "Storing article without content: {}", reason);
                    if let Some(map) = details.as_object_mut() {
                        map.insert("partial".to_string(), serde_json::Value::Bool(true));
                        map.insert(
                            "content_error".to_string(),
                            serde_json::Value::String(reason.clone()),
                        );
                    }
                    report.content_failures.push(ContentFailure { url, reason });
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let article = NewArticle {
            account_id,
            title: summary.title,
            url: summary.url,
            publish_time: summary.publish_time,
            content,
            summary: None,
            details,
        };

        match store_if_new(self.storage, &article)? {
            StoreOutcome::Inserted => report.articles_stored += 1,
            StoreOutcome::Skipped => report.articles_skipped += 1,
        }
        Ok(())
    }

    async fn fetch_content(&self, url: &str) -> Result<String, CrawlError> {
        let timeout = self.settings.content_timeout;
        let result = self
            .gated(
                || async move {
                    match tokio::time::timeout(timeout, self.api.get_article_body(self.credential, url))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ApiError::Timeout(timeout)),
                    }
                },
                |e| CrawlError::ArticleContentFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                },
            )
            .await;

        match result {
            Err(CrawlError::Throttled { attempts }) => Err(CrawlError::ArticleContentFailed {
                url: url.to_string(),
                reason: format!("still throttled after {} attempts", attempts),
            }),
            other => other,
        }
    }

    /// Issues one call through the gate, retrying while throttled
    ///
    /// A rejected session always maps to `SessionExpired`; other API errors
    /// go through `on_error`.
    async fn gated<T, F, Fut>(
        &self,
        mut call: F,
        on_error: impl FnOnce(ApiError) -> CrawlError,
    ) -> Result<T, CrawlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempts = 0u32;
        loop {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CrawlError::Cancelled),
                permit = self.gate.acquire() => permit,
            };

            attempts += 1;
            match call().await {
                Ok(value) => {
                    permit.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_throttled() => {
                    let backoff = permit.record_throttled();
                    if attempts > self.settings.max_throttle_retries {
                        return Err(CrawlError::Throttled { attempts });
                    }
                    tracing::warn!(
                        attempt = attempts,
                        max = self.settings.max_throttle_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying throttled request"
                    );
                }
                Err(ApiError::SessionInvalid(reason)) => {
                    return Err(CrawlError::SessionExpired(reason));
                }
                Err(e) => return Err(on_error(e)),
            }
        }
    }
}

fn advance(state: &mut WalkState, next: WalkState) -> Result<(), CrawlError> {
    if !state.can_transition_to(next) {
        return Err(CrawlError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    tracing::trace!("Walk state {} -> {}", state, next);
    *state = next;
    Ok(())
}

/// Picks the candidate whose nickname equals `name`, else the first one
fn pick_candidate(name: &str, candidates: Vec<AccountCandidate>) -> Option<AccountCandidate> {
    let exact = candidates.iter().position(|c| c.nickname == name);
    candidates.into_iter().nth(exact.unwrap_or(0))
}

/// Keeps articles at or after the cutoff, in page order
///
/// # Returns
///
/// The retained articles and how many were dropped as too old
fn partition_by_cutoff(
    articles: Vec<ArticleSummary>,
    cutoff: Option<DateTime<Utc>>,
) -> (Vec<ArticleSummary>, u32) {
    let Some(cutoff) = cutoff else {
        return (articles, 0);
    };

    let total = articles.len();
    let retained: Vec<ArticleSummary> = articles
        .into_iter()
        .filter(|a| a.publish_time >= cutoff)
        .collect();
    let dropped = (total - retained.len()) as u32;
    (retained, dropped)
}
