//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{CrawlCheckpoint, Outcome, StopReason};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    AccountOutcomeRecord, AccountRecord, ArticleQuery, ArticleRecord, NewArticle, RunRecord,
    RunStatus,
};
use chrono::{TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

const ACCOUNT_COLUMNS: &str =
    "id, platform, name, external_id, details, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "a.id, a.account_id, a.title, a.url, a.publish_timestamp, \
     a.content, a.summary, a.details, a.created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        tracing::debug!("Opened database at {}", path.display());
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_details(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

fn serialize_details(details: &serde_json::Value) -> StorageResult<String> {
    serde_json::to_string(details).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
    Ok(AccountRecord {
        id: row.get(0)?,
        platform: row.get(1)?,
        name: row.get(2)?,
        external_id: row.get(3)?,
        details: parse_details(&row.get::<_, String>(4)?),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    let timestamp: i64 = row.get(4)?;
    Ok(ArticleRecord {
        id: row.get(0)?,
        account_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        publish_time: Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default(),
        content: row.get(5)?,
        summary: row.get(6)?,
        details: parse_details(&row.get::<_, String>(7)?),
        created_at: row.get(8)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn complete_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn record_account_outcome(
        &mut self,
        run_id: i64,
        account: &str,
        outcome: Outcome,
        stop_reason: Option<StopReason>,
        articles_stored: u32,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO run_outcomes (run_id, account, outcome, stop_reason, articles_stored, error_message, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                account,
                outcome.to_db_string(),
                stop_reason.map(|r| r.to_db_string()),
                articles_stored,
                error,
                now
            ],
        )?;
        Ok(())
    }

    fn get_run_outcomes(&self, run_id: i64) -> StorageResult<Vec<AccountOutcomeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, account, outcome, stop_reason, articles_stored, error_message
             FROM run_outcomes WHERE run_id = ?1 ORDER BY id",
        )?;

        let outcomes = stmt
            .query_map(params![run_id], |row| {
                let stop_reason: Option<String> = row.get(3)?;
                Ok(AccountOutcomeRecord {
                    run_id: row.get(0)?,
                    account: row.get(1)?,
                    outcome: Outcome::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(Outcome::Aborted),
                    stop_reason: stop_reason.as_deref().and_then(StopReason::from_db_string),
                    articles_stored: row.get(4)?,
                    error: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(outcomes)
    }

    // ===== Accounts =====

    fn upsert_account(
        &mut self,
        platform: &str,
        name: &str,
        external_id: &str,
        details: &serde_json::Value,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let details = serialize_details(details)?;

        self.conn.execute(
            "INSERT INTO accounts (platform, name, external_id, details, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(platform, name) DO UPDATE SET
                external_id = excluded.external_id,
                details = excluded.details,
                updated_at = excluded.updated_at",
            params![platform, name, external_id, details, now],
        )?;

        // last_insert_rowid is not updated by the conflict branch
        let id = self.conn.query_row(
            "SELECT id FROM accounts WHERE platform = ?1 AND name = ?2",
            params![platform, name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_account(&self, platform: &str, name: &str) -> StorageResult<Option<AccountRecord>> {
        let account = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM accounts WHERE platform = ?1 AND name = ?2",
                    ACCOUNT_COLUMNS
                ),
                params![platform, name],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn list_accounts(&self, platform: Option<&str>) -> StorageResult<Vec<AccountRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE (?1 IS NULL OR platform = ?1) ORDER BY platform, name",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![platform], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn list_platforms(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT platform FROM accounts ORDER BY platform")?;

        let platforms = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(platforms)
    }

    // ===== Articles =====

    fn article_exists(&self, url: &str) -> StorageResult<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM articles WHERE url = ?1",
                params![url],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn upsert_article(&mut self, article: &NewArticle) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let details = serialize_details(&article.details)?;

        let inserted = self.conn.execute(
            "INSERT INTO articles
                (account_id, title, url, publish_time, publish_timestamp, content, summary, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(url) DO NOTHING",
            params![
                article.account_id,
                article.title,
                article.url,
                article.publish_time.to_rfc3339(),
                article.publish_time.timestamp(),
                article.content,
                article.summary,
                details,
                now
            ],
        )?;

        Ok(inserted == 1)
    }

    fn get_article(&self, article_id: i64) -> StorageResult<Option<ArticleRecord>> {
        let article = self
            .conn
            .query_row(
                &format!("SELECT {} FROM articles a WHERE a.id = ?1", ARTICLE_COLUMNS),
                params![article_id],
                article_from_row,
            )
            .optional()?;
        Ok(article)
    }

    fn query_articles(&self, query: &ArticleQuery) -> StorageResult<Vec<ArticleRecord>> {
        let mut sql = format!(
            "SELECT {} FROM articles a JOIN accounts c ON c.id = a.account_id WHERE 1 = 1",
            ARTICLE_COLUMNS
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(account_id) = query.account_id {
            sql.push_str(" AND a.account_id = ?");
            values.push(Value::Integer(account_id));
        }
        if let Some(platform) = &query.platform {
            sql.push_str(" AND c.platform = ?");
            values.push(Value::Text(platform.clone()));
        }
        if let Some(since) = query.since {
            sql.push_str(" AND a.publish_timestamp >= ?");
            values.push(Value::Integer(since.timestamp()));
        }
        if let Some(until) = query.until {
            sql.push_str(" AND a.publish_timestamp <= ?");
            values.push(Value::Integer(until.timestamp()));
        }

        let keywords: Vec<&str> = query
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            let clauses: Vec<&str> = keywords
                .iter()
                .map(|_| "(a.title LIKE ? OR a.content LIKE ? OR a.summary LIKE ?)")
                .collect();
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
            for keyword in keywords {
                let pattern = format!("%{}%", keyword);
                for _ in 0..3 {
                    values.push(Value::Text(pattern.clone()));
                }
            }
        }

        sql.push_str(" ORDER BY a.publish_timestamp DESC, a.id DESC LIMIT ? OFFSET ?");
        values.push(Value::Integer(i64::from(query.limit)));
        values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let articles = stmt
            .query_map(params_from_iter(values.iter()), article_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    fn count_articles(&self, account_id: Option<i64>) -> StorageResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE (?1 IS NULL OR account_id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn update_article_summary(&mut self, article_id: i64, summary: &str) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE articles SET summary = ?1 WHERE id = ?2",
            params![summary, article_id],
        )?;
        Ok(updated == 1)
    }

    fn get_article_summary(&self, article_id: i64) -> StorageResult<Option<String>> {
        let summary: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT summary FROM articles WHERE id = ?1",
                params![article_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(summary.flatten())
    }

    // ===== Checkpoints =====

    fn save_checkpoint(&mut self, checkpoint: &CrawlCheckpoint) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO checkpoints
                (platform, account, external_id, pages_completed, earliest_publish_timestamp, stop_reason, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(platform, account) DO UPDATE SET
                external_id = excluded.external_id,
                pages_completed = excluded.pages_completed,
                earliest_publish_timestamp = excluded.earliest_publish_timestamp,
                stop_reason = excluded.stop_reason,
                updated_at = excluded.updated_at",
            params![
                checkpoint.platform,
                checkpoint.account,
                checkpoint.external_id,
                checkpoint.pages_completed,
                checkpoint.earliest_seen_publish_time.map(|t| t.timestamp()),
                checkpoint.stop_reason.map(|r| r.to_db_string()),
                now
            ],
        )?;
        Ok(())
    }

    fn load_checkpoint(
        &self,
        platform: &str,
        account: &str,
    ) -> StorageResult<Option<CrawlCheckpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT platform, account, external_id, pages_completed, earliest_publish_timestamp, stop_reason
                 FROM checkpoints WHERE platform = ?1 AND account = ?2",
                params![platform, account],
                |row| {
                    let earliest: Option<i64> = row.get(4)?;
                    let stop_reason: Option<String> = row.get(5)?;
                    Ok(CrawlCheckpoint {
                        platform: row.get(0)?,
                        account: row.get(1)?,
                        external_id: row.get(2)?,
                        pages_completed: row.get(3)?,
                        earliest_seen_publish_time: earliest
                            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                        stop_reason: stop_reason.as_deref().and_then(StopReason::from_db_string),
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    fn clear_checkpoint(&mut self, platform: &str, account: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM checkpoints WHERE platform = ?1 AND account = ?2",
            params![platform, account],
        )?;
        Ok(())
    }
}
