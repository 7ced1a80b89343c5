//! Wire formats of the public platform's JSON endpoints

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Status block present in every JSON response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseResp {
    #[serde(default)]
    pub ret: i64,
    #[serde(default)]
    pub err_msg: String,
}

/// Return code the platform uses for "frequency limited"
pub const RET_FREQ_CONTROL: i64 = 200013;

/// Return codes meaning the token or cookies are no longer accepted
pub const RET_SESSION_INVALID: [i64; 3] = [-6, 200003, 200040];

#[derive(Debug, Clone, Deserialize)]
pub struct SearchBizResponse {
    #[serde(default)]
    pub base_resp: BaseResp,
    #[serde(default)]
    pub list: Vec<BizItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BizItem {
    pub fakeid: String,
    pub nickname: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub round_head_img: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppMsgResponse {
    #[serde(default)]
    pub base_resp: BaseResp,
    pub app_msg_list: Option<Vec<AppMsgItem>>,
    #[serde(default)]
    pub app_msg_cnt: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppMsgItem {
    #[serde(default)]
    pub aid: String,
    pub title: String,
    pub link: String,
    pub update_time: i64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub cover: String,
}

/// An account returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountCandidate {
    /// The platform's opaque account id (`fakeid`)
    pub external_id: String,
    pub nickname: String,
    pub alias: String,
    pub signature: String,
    pub avatar: String,
}

impl From<BizItem> for AccountCandidate {
    fn from(item: BizItem) -> Self {
        Self {
            external_id: item.fakeid,
            nickname: item.nickname,
            alias: item.alias,
            signature: item.signature,
            avatar: item.round_head_img,
        }
    }
}

/// One entry of an account's article history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSummary {
    pub aid: String,
    pub title: String,
    pub url: String,
    pub publish_time: DateTime<Utc>,
    pub digest: String,
    pub cover: String,
}

impl ArticleSummary {
    /// Converts a wire item, rejecting timestamps chrono cannot represent
    pub fn from_item(item: AppMsgItem) -> Option<Self> {
        let publish_time = Utc.timestamp_opt(item.update_time, 0).single()?;
        Some(Self {
            aid: item.aid,
            title: item.title,
            url: item.link,
            publish_time,
            digest: item.digest,
            cover: item.cover,
        })
    }

    /// Opaque details persisted alongside the article
    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "aid": self.aid,
            "digest": self.digest,
            "cover": self.cover,
            "publish_timestamp": self.publish_time.timestamp(),
        })
    }
}
