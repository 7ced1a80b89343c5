//! Crawler module for archiving account histories
//!
//! This module contains the crawl engine, including:
//! - The process-wide rate gate with throttling backoff
//! - The per-account paginated walk
//! - The dedup filter in front of article storage
//! - Batch coordination across many accounts with progress reporting

mod coordinator;
mod dedup;
mod gate;
mod progress;
mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{parse_account_list, BatchCoordinator};
pub use dedup::{is_stored, store_if_new, StoreOutcome};
pub use gate::{GatePermit, RateGate};
pub use progress::{AccountStatus, BatchProgress, LoggingObserver, ProgressObserver};
pub use walker::{AccountWalker, ContentFailure, WalkReport, WalkSettings};

use crate::state::WalkState;
use crate::storage::{Storage, StorageError, StorageResult};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised while walking an account
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The credential is missing, stale or was rejected remotely
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Throttling persisted through every retry
    #[error("Still throttled after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("Fetching page {page} failed: {reason}")]
    PageFetchFailed { page: u32, reason: String },

    #[error("Fetching content of {url} failed: {reason}")]
    ArticleContentFailed { url: String, reason: String },

    #[error("Account search failed: {0}")]
    SearchFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid walk transition: {from} -> {to}")]
    InvalidTransition { from: WalkState, to: WalkState },

    #[error("Crawl cancelled")]
    Cancelled,

    /// The walk panicked; only that account is affected
    #[error("Walk panicked: {0}")]
    Panicked(String),
}

/// Storage object shared by every walk of a batch
pub type DynStorage = dyn Storage + Send;

/// Shared handle to the storage backend
pub type SharedStorage = Arc<Mutex<DynStorage>>;

/// Wraps a storage backend for sharing across walks
pub fn shared_storage<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs one storage operation under the shared lock
///
/// The lock is released before returning, so callers never hold it across
/// an await point.
pub(crate) fn with_storage<T>(
    storage: &SharedStorage,
    op: impl FnOnce(&mut DynStorage) -> StorageResult<T>,
) -> StorageResult<T> {
    let mut guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
    op(&mut *guard)
}
