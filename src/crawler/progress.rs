//! Batch progress tracking and observers
//!
//! Observers are called synchronously from the coordinator's control flow,
//! once per finished account. They must return quickly.

use crate::crawler::WalkReport;
use crate::state::Outcome;
use std::collections::HashMap;

/// Receives progress notifications from a running batch
pub trait ProgressObserver: Send + Sync {
    /// Called after each account finishes, following `on_account_done`
    fn on_progress(&self, _batch_id: &str, _completed: usize, _total: usize) {}

    /// Called when one account's walk reaches a terminal state
    fn on_account_done(&self, _account: &str, _status: &AccountStatus) {}
}

/// Observer that logs every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_progress(&self, batch_id: &str, completed: usize, total: usize) {
        tracing::info!("[{}] {}/{} accounts done", batch_id, completed, total);
    }

    fn on_account_done(&self, account: &str, status: &AccountStatus) {
        match &status.report.error {
            Some(error) => tracing::warn!("{}: {} ({})", account, status.outcome, error),
            None => tracing::info!(
                "{}: {} ({} new, {} already stored)",
                account,
                status.outcome,
                status.report.articles_stored,
                status.report.articles_skipped
            ),
        }
    }
}

/// Terminal status of one account in a batch
#[derive(Debug)]
pub struct AccountStatus {
    pub outcome: Outcome,
    pub report: WalkReport,
}

impl AccountStatus {
    pub fn error_message(&self) -> Option<String> {
        self.report.error.as_ref().map(|e| e.to_string())
    }
}

/// Progress and per-account results of a batch
#[derive(Debug)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total_accounts: usize,
    pub completed_count: usize,
    pub per_account_status: HashMap<String, AccountStatus>,
}

impl BatchProgress {
    pub fn new(batch_id: impl Into<String>, total_accounts: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            total_accounts,
            completed_count: 0,
            per_account_status: HashMap::with_capacity(total_accounts),
        }
    }

    /// Records a finished walk and returns its status
    pub fn record(&mut self, report: WalkReport) -> &AccountStatus {
        self.completed_count += 1;
        let account = report.account.clone();
        let status = AccountStatus {
            outcome: report.outcome,
            report,
        };
        self.per_account_status.insert(account.clone(), status);
        &self.per_account_status[&account]
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count == self.total_accounts
    }

    /// Accounts that ended with the given outcome, sorted by name
    pub fn accounts_with(&self, outcome: Outcome) -> Vec<&str> {
        let mut accounts: Vec<&str> = self
            .per_account_status
            .iter()
            .filter(|(_, status)| status.outcome == outcome)
            .map(|(name, _)| name.as_str())
            .collect();
        accounts.sort_unstable();
        accounts
    }

    pub fn total_articles_stored(&self) -> u32 {
        self.per_account_status
            .values()
            .map(|s| s.report.articles_stored)
            .sum()
    }
}
