//! Storage module for persisting archived content
//!
//! This module handles all database operations for the archiver, including:
//! - SQLite database initialization and schema management
//! - Account upserts keyed by (platform, name)
//! - Idempotent article storage keyed by url, and article queries
//! - Walk checkpoints for resumption
//! - Batch run tracking with per-account outcomes

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{Outcome, StopReason};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Platform identifier for WeChat public accounts
pub const PLATFORM_WECHAT: &str = "wechat";

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents an account in the database
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub id: i64,
    pub platform: String,
    pub name: String,
    pub external_id: String,
    pub details: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// An article about to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub account_id: i64,
    pub title: String,
    pub url: String,
    pub publish_time: DateTime<Utc>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub details: serde_json::Value,
}

/// Represents a stored article
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub url: String,
    pub publish_time: DateTime<Utc>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// Filters for querying stored articles
///
/// All filters are optional; results are ordered newest first.
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub account_id: Option<i64>,
    pub platform: Option<String>,

    /// Inclusive lower bound on publish time
    pub since: Option<DateTime<Utc>>,

    /// Inclusive upper bound on publish time
    pub until: Option<DateTime<Utc>>,

    /// Matches articles whose title, content or summary contains any keyword
    pub keywords: Vec<String>,

    pub limit: u32,
    pub offset: u32,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            account_id: None,
            platform: None,
            since: None,
            until: None,
            keywords: Vec::new(),
            limit: 100,
            offset: 0,
        }
    }
}

/// Represents a batch run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome of one account within a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOutcomeRecord {
    pub run_id: i64,
    pub account: String,
    pub outcome: Outcome,
    pub stop_reason: Option<StopReason>,
    pub articles_stored: u32,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), RunStatus::from_db_string(db_str));
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_article_query_default() {
        let query = ArticleQuery::default();
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
        assert!(query.keywords.is_empty());
        assert!(query.account_id.is_none());
    }
}
