//! Batch coordinator - runs account walks under one concurrency budget
//!
//! This module contains the batch loop, including:
//! - Fail-fast checks on the credential and concurrency before any walk
//! - A bounded pool of concurrent walks sharing one gate and credential
//! - Per-account failure isolation and outcome recording
//! - Synchronous progress notification
//! - Batch-wide cancellation

use crate::api::WechatApi;
use crate::config::{validate_concurrency, Config};
use crate::crawler::progress::{BatchProgress, ProgressObserver};
use crate::crawler::walker::{AccountWalker, WalkReport, WalkSettings};
use crate::crawler::{with_storage, CrawlError, RateGate, SharedStorage};
use crate::session::Credential;
use crate::storage::RunStatus;
use crate::ArchiverError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Coordinates walks over many accounts
pub struct BatchCoordinator {
    api: Arc<dyn WechatApi>,
    gate: RateGate,
    storage: SharedStorage,
    credential: Arc<Credential>,
    session_ttl: chrono::Duration,
    settings: WalkSettings,
    cancel: CancellationToken,
    observers: Vec<Arc<dyn ProgressObserver>>,
    config_hash: String,
}

impl BatchCoordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    ///
    /// * `api` - The counterparty API
    /// * `storage` - Shared storage backend
    /// * `credential` - Session credential, read-only for the whole batch
    /// * `config` - Gate, session and crawl settings
    pub fn new(
        api: Arc<dyn WechatApi>,
        storage: SharedStorage,
        credential: Credential,
        config: &Config,
    ) -> Self {
        Self {
            api,
            gate: RateGate::from_config(&config.gate),
            storage,
            credential: Arc::new(credential),
            session_ttl: config.session.ttl(),
            settings: WalkSettings::from_config(config),
            cancel: CancellationToken::new(),
            observers: Vec::new(),
            config_hash: String::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Shares a gate with other coordinators using the same credential
    pub fn with_gate(mut self, gate: RateGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_settings(mut self, settings: WalkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Token that cancels every batch run by this coordinator
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub fn settings(&self) -> &WalkSettings {
        &self.settings
    }

    /// Walks every account and returns the per-account outcomes
    ///
    /// Only an invalid concurrency, an unusable credential or a failure to
    /// record the run fail the whole batch, and only before any walk
    /// starts. Once running, every account reaches a terminal state.
    ///
    /// # Arguments
    ///
    /// * `accounts` - Account names, in scheduling order; duplicates are walked once
    /// * `concurrency` - Number of walks in flight
    pub async fn run(
        &self,
        accounts: &[String],
        concurrency: usize,
    ) -> Result<BatchProgress, ArchiverError> {
        validate_concurrency(concurrency)?;

        if !self.credential.is_valid_at(self.session_ttl, Utc::now()) {
            return Err(CrawlError::SessionExpired(format!(
                "credential issued at {} is past its TTL",
                self.credential.issued_at.to_rfc3339()
            ))
            .into());
        }

        let accounts = unique_accounts(accounts);
        let run_id = with_storage(&self.storage, |s| s.create_run(&self.config_hash))?;
        let batch_id = format!("batch-{}", run_id);
        let total = accounts.len();

        tracing::info!(
            batch_id = %batch_id,
            accounts = total,
            concurrency,
            "Starting batch"
        );

        // Cancelled with the coordinator token, never the other way round
        let batch_cancel = self.cancel.child_token();
        let walker = AccountWalker::new(
            self.api.as_ref(),
            &self.gate,
            &self.storage,
            self.credential.as_ref(),
            &self.settings,
            &batch_cancel,
        );

        let mut progress = BatchProgress::new(batch_id.clone(), total);
        let mut walks = stream::iter(accounts.iter())
            .map(|account| isolated_walk(&walker, account))
            .buffer_unordered(concurrency);

        while let Some(report) = walks.next().await {
            if matches!(report.error, Some(CrawlError::SessionExpired(_)))
                && !batch_cancel.is_cancelled()
            {
                tracing::error!(
                    account = %report.account,
                    "Session rejected, cancelling remaining accounts"
                );
                batch_cancel.cancel();
            }

            self.record_outcome(run_id, &report);

            let account = report.account.clone();
            let status = progress.record(report);
            for observer in &self.observers {
                observer.on_account_done(&account, status);
            }
            for observer in &self.observers {
                observer.on_progress(&batch_id, progress.completed_count, total);
            }
        }

        let status = if batch_cancel.is_cancelled() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        if let Err(e) = with_storage(&self.storage, |s| s.complete_run(run_id, status)) {
            tracing::warn!("Failed to complete run {}: {}", run_id, e);
        }

        tracing::info!(
            batch_id = %batch_id,
            completed = progress.completed_count,
            stored = progress.total_articles_stored(),
            "Batch finished"
        );
        Ok(progress)
    }

    fn record_outcome(&self, run_id: i64, report: &WalkReport) {
        let error = report.error.as_ref().map(|e| e.to_string());
        let result = with_storage(&self.storage, |s| {
            s.record_account_outcome(
                run_id,
                &report.account,
                report.outcome,
                report.stop_reason,
                report.articles_stored,
                error.as_deref(),
            )
        });
        if let Err(e) = result {
            tracing::warn!(account = %report.account, "Failed to record outcome: {}", e);
        }
    }
}

/// Runs one walk, turning a panic into an aborted report for that account
async fn isolated_walk(walker: &AccountWalker<'_>, account: &str) -> WalkReport {
    match AssertUnwindSafe(walker.walk(account)).catch_unwind().await {
        Ok(report) => report,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(account = %account, "Walk panicked: {}", message);
            WalkReport::aborted(account, CrawlError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Splits an account list on newlines, whitespace, `|` and ASCII or full-width separators
pub fn parse_account_list(text: &str) -> Vec<String> {
    const SEPARATORS: [char; 6] = [',', ';', '|', '\u{ff0c}', '\u{ff1b}', '\u{3001}'];
    let names: Vec<String> = text
        .split(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    unique_accounts(&names)
}

/// Trims names, drops empty ones and keeps the first of each duplicate
fn unique_accounts(accounts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    accounts
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| {
            let first = seen.insert(a.to_string());
            if !first {
                tracing::warn!("Ignoring duplicate account '{}'", a);
            }
            first
        })
        .map(str::to_string)
        .collect()
}
