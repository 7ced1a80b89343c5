//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlCheckpoint, Outcome, StopReason};
use crate::storage::{
    AccountOutcomeRecord, AccountRecord, ArticleQuery, ArticleRecord, NewArticle, RunRecord,
    RunStatus,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is idempotent with respect to the uniqueness keys: accounts
/// are keyed by (platform, name), articles by url.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new batch run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status
    fn complete_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Records the terminal outcome of one account within a run
    fn record_account_outcome(
        &mut self,
        run_id: i64,
        account: &str,
        outcome: Outcome,
        stop_reason: Option<StopReason>,
        articles_stored: u32,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Gets all account outcomes of a run, in completion order
    fn get_run_outcomes(&self, run_id: i64) -> StorageResult<Vec<AccountOutcomeRecord>>;

    // ===== Accounts =====

    /// Inserts an account or updates the existing one
    ///
    /// A second save with the same `(platform, name)` updates `external_id`
    /// and `details` in place.
    ///
    /// # Returns
    ///
    /// The account ID (either newly created or existing)
    fn upsert_account(
        &mut self,
        platform: &str,
        name: &str,
        external_id: &str,
        details: &serde_json::Value,
    ) -> StorageResult<i64>;

    /// Gets an account by its unique key
    fn get_account(&self, platform: &str, name: &str) -> StorageResult<Option<AccountRecord>>;

    /// Lists accounts, optionally restricted to one platform
    fn list_accounts(&self, platform: Option<&str>) -> StorageResult<Vec<AccountRecord>>;

    /// Lists every platform that has at least one account
    fn list_platforms(&self) -> StorageResult<Vec<String>>;

    // ===== Articles =====

    /// Returns true if an article with this url is stored
    fn article_exists(&self, url: &str) -> StorageResult<bool>;

    /// Stores an article unless its url is already present
    ///
    /// # Returns
    ///
    /// * `true` - The article was inserted
    /// * `false` - An article with this url already existed and was left untouched
    fn upsert_article(&mut self, article: &NewArticle) -> StorageResult<bool>;

    /// Gets an article by ID
    fn get_article(&self, article_id: i64) -> StorageResult<Option<ArticleRecord>>;

    /// Queries articles, newest first
    fn query_articles(&self, query: &ArticleQuery) -> StorageResult<Vec<ArticleRecord>>;

    /// Counts articles, optionally for one account
    fn count_articles(&self, account_id: Option<i64>) -> StorageResult<i64>;

    /// Replaces the summary of an existing article
    ///
    /// # Returns
    ///
    /// `false` if no article has this ID
    fn update_article_summary(&mut self, article_id: i64, summary: &str) -> StorageResult<bool>;

    /// Gets the summary of an article
    fn get_article_summary(&self, article_id: i64) -> StorageResult<Option<String>>;

    // ===== Checkpoints =====

    /// Saves the checkpoint of a walk, replacing any previous one
    fn save_checkpoint(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()>;

    /// Loads the checkpoint of a walk
    fn load_checkpoint(&self, platform: &str, account: &str)
        -> StorageResult<Option<CrawlCheckpoint>>;

    /// Removes the checkpoint of a walk
    fn clear_checkpoint(&mut self, platform: &str, account: &str) -> StorageResult<()>;
}
