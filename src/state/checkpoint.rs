use crate::state::StopReason;
use chrono::{DateTime, Utc};

/// How far one account's walk has progressed
///
/// Created when a walk starts, updated after every completed page and
/// persisted so an interrupted walk resumes at the next page instead of
/// page one. Cleared when a walk ends successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlCheckpoint {
    pub platform: String,
    pub account: String,

    /// Platform account id, once resolved
    pub external_id: Option<String>,

    /// Number of pages fully processed; also the zero-based index of the next page
    pub pages_completed: u32,

    /// Oldest publish time seen so far
    pub earliest_seen_publish_time: Option<DateTime<Utc>>,

    /// Set once the walk stopped
    pub stop_reason: Option<StopReason>,
}

impl CrawlCheckpoint {
    pub fn new(platform: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            account: account.into(),
            external_id: None,
            pages_completed: 0,
            earliest_seen_publish_time: None,
            stop_reason: None,
        }
    }

    /// Zero-based index of the page the walk should fetch next
    pub fn next_page(&self) -> u32 {
        self.pages_completed
    }

    /// Records a completed page and the oldest publish time on it
    pub fn record_page(&mut self, oldest: Option<DateTime<Utc>>) {
        self.pages_completed += 1;
        if let Some(oldest) = oldest {
            self.earliest_seen_publish_time = Some(match self.earliest_seen_publish_time {
                Some(seen) if seen <= oldest => seen,
                _ => oldest,
            });
        }
    }

    pub fn finish(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }

    /// True when a previous walk stopped before a natural end
    pub fn is_resumable(&self) -> bool {
        self.pages_completed > 0
            && self
                .stop_reason
                .map(|reason| !reason.outcome().is_success())
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_checkpoint() {
        let checkpoint = CrawlCheckpoint::new("wechat", "Daily Tech");
        assert_eq!(checkpoint.next_page(), 0);
        assert!(checkpoint.earliest_seen_publish_time.is_none());
        assert!(!checkpoint.is_resumable());
    }

    #[test]
    fn test_record_page_tracks_earliest() {
        let mut checkpoint = CrawlCheckpoint::new("wechat", "Daily Tech");
        let t1 = Utc.timestamp_opt(2_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_000, 0).unwrap();

        checkpoint.record_page(Some(t1));
        checkpoint.record_page(Some(t2));
        checkpoint.record_page(None);

        assert_eq!(checkpoint.pages_completed, 3);
        assert_eq!(checkpoint.next_page(), 3);
        assert_eq!(checkpoint.earliest_seen_publish_time, Some(t2));
    }

    #[test]
    fn test_is_resumable() {
        let mut checkpoint = CrawlCheckpoint::new("wechat", "Daily Tech");
        checkpoint.record_page(None);

        // Interrupted without a stop reason
        assert!(checkpoint.is_resumable());

        checkpoint.finish(StopReason::Failed);
        assert!(checkpoint.is_resumable());

        checkpoint.finish(StopReason::DateCutoff);
        assert!(!checkpoint.is_resumable());
    }
}
