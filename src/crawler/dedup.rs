//! Dedup filter in front of article storage
//!
//! An article url is stored at most once. A failed existence check is an
//! error, never a reason to skip.

use crate::crawler::{with_storage, SharedStorage};
use crate::storage::{NewArticle, StorageResult};

/// What happened to a candidate article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The article was new and has been written
    Inserted,

    /// An article with the same url was already stored; nothing was written
    Skipped,
}

/// Returns true if an article with this url is already stored
pub fn is_stored(storage: &SharedStorage, url: &str) -> StorageResult<bool> {
    with_storage(storage, |s| s.article_exists(url))
}

/// Stores the article unless its url is already present
///
/// The url constraint decides, so this costs a single write even when the
/// caller has not checked [`is_stored`] first.
pub fn store_if_new(storage: &SharedStorage, article: &NewArticle) -> StorageResult<StoreOutcome> {
    let inserted = with_storage(storage, |s| s.upsert_article(article))?;
    if inserted {
        Ok(StoreOutcome::Inserted)
    } else {
        tracing::trace!("Skipping already stored {}", article.url);
        Ok(StoreOutcome::Skipped)
    }
}
