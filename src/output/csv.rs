//! CSV writer for archived articles
//!
//! One row per article with the account name resolved. Line breaks inside
//! the article body are written as the two-character sequences `\n` and
//! `\r` so every record stays on one physical line.

use crate::output::{OutputError, OutputResult};
use crate::storage::ArticleRecord;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column names of the export, in order
pub const CSV_HEADER: [&str; 6] = ["account", "title", "publish_time", "url", "summary", "content"];

/// Byte order mark so spreadsheet applications detect UTF-8
const UTF8_BOM: &str = "\u{feff}";

/// Writes the header and one row per article
///
/// # Arguments
///
/// * `out` - Destination writer
/// * `articles` - Articles in output order
/// * `account_names` - Account names by storage id; unknown ids export as empty
///
/// # Returns
///
/// The number of rows written, header excluded
pub fn write_articles_csv<W: Write>(
    out: &mut W,
    articles: &[ArticleRecord],
    account_names: &HashMap<i64, String>,
) -> OutputResult<usize> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;

    for article in articles {
        let account = account_names
            .get(&article.account_id)
            .map(String::as_str)
            .unwrap_or("");
        let publish_time = article.publish_time.format("%Y-%m-%d %H:%M:%S").to_string();
        let content = article
            .content
            .as_deref()
            .map(flatten_line_breaks)
            .unwrap_or_default();

        let record = [
            escape_csv(account),
            escape_csv(&article.title),
            Cow::Owned(publish_time),
            escape_csv(&article.url),
            escape_csv(article.summary.as_deref().unwrap_or("")),
            escape_csv(&content),
        ];
        writeln!(out, "{}", record.join(","))?;
    }

    out.flush()?;
    Ok(articles.len())
}

/// Writes the articles to a CSV file, creating parent directories
///
/// An empty article list is an error and leaves no file behind.
pub fn export_articles_csv(
    path: &Path,
    articles: &[ArticleRecord],
    account_names: &HashMap<i64, String>,
) -> OutputResult<usize> {
    if articles.is_empty() {
        return Err(OutputError::Empty);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(UTF8_BOM.as_bytes())?;
    let written = write_articles_csv(&mut out, articles, account_names)?;
    tracing::info!("Exported {} articles to {}", written, path.display());
    Ok(written)
}

fn flatten_line_breaks(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

/// Quotes a field when it holds a separator, quote or line break
fn escape_csv(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn article(id: i64, account_id: i64, title: &str, content: Option<&str>) -> ArticleRecord {
        ArticleRecord {
            id,
            account_id,
            title: title.to_string(),
            url: format!("https://mp.weixin.qq.com/s/{}", id),
            publish_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            content: content.map(str::to_string),
            summary: None,
            details: json!({}),
            created_at: String::new(),
        }
    }

    fn names() -> HashMap<i64, String> {
        HashMap::from([(1, "Daily Tech".to_string())])
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_write_rows() {
        let articles = vec![
            article(1, 1, "Hello, world", Some("line one\nline two")),
            article(2, 9, "No body", None),
        ];
        let mut out = Vec::new();

        let written = write_articles_csv(&mut out, &articles, &names()).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "account,title,publish_time,url,summary,content");
        assert_eq!(
            lines[1],
            "Daily Tech,\"Hello, world\",2023-11-14 22:13:20,https://mp.weixin.qq.com/s/1,,line one\\nline two"
        );
        assert_eq!(lines[2], ",No body,2023-11-14 22:13:20,https://mp.weixin.qq.com/s/2,,");
    }

    #[test]
    fn test_export_creates_file_with_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exports").join("articles.csv");

        let written = export_articles_csv(&path, &[article(1, 1, "Title", Some("Body"))], &names()).unwrap();
        assert_eq!(written, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('\u{feff}'));
        assert!(text.contains("Daily Tech,Title,"));
    }

    #[test]
    fn test_export_nothing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");

        assert!(matches!(
            export_articles_csv(&path, &[], &names()),
            Err(OutputError::Empty)
        ));
        assert!(!path.exists());
    }
}
