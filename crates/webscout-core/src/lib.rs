use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Coarse classification of a failed HTTP fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Timeout,
    Dns,
    Connect,
    Other,
}

impl FetchFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Other => "other",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("fetch failed ({}): {message}", .kind.as_str())]
    Fetch {
        kind: FetchFailureKind,
        message: String,
    },
    #[error("all mirrors unavailable ({attempts} attempts)")]
    MirrorUnavailable { attempts: usize },
    #[error("not found or unavailable: {0}")]
    NotFoundOrUnavailable(String),
    #[error("parse failed: {0}")]
    ParseFailed(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl Error {
    pub fn fetch(kind: FetchFailureKind, message: impl ToString) -> Self {
        Self::Fetch {
            kind,
            message: message.to_string(),
        }
    }

    /// Stable snake_case identifier, used in per-item batch errors and tool envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::InvalidInput(_) => "invalid_params",
            Self::Fetch { .. } => "fetch_failed",
            Self::MirrorUnavailable { .. } | Self::NotFoundOrUnavailable(_) => {
                "not_found_or_unavailable"
            }
            Self::ParseFailed(_) => "parse_failed",
            Self::Search(_) => "search_failed",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the whole request (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Extra headers, applied after the fetcher's defaults.
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// Why a [`PageRecord`] carries an explanation instead of page content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageFailure {
    InvalidUrl,
    Timeout,
    Dns,
    Connect,
    HttpStatus { status: u16 },
    NonHtml { content_type: String },
    Fetch,
}

impl PageFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::HttpStatus { .. } => "http_status",
            Self::NonHtml { .. } => "non_html",
            Self::Fetch => "fetch",
        }
    }
}

impl From<FetchFailureKind> for PageFailure {
    fn from(kind: FetchFailureKind) -> Self {
        match kind {
            FetchFailureKind::Timeout => Self::Timeout,
            FetchFailureKind::Dns => Self::Dns,
            FetchFailureKind::Connect => Self::Connect,
            FetchFailureKind::Other => Self::Fetch,
        }
    }
}

/// Main text of one web page (or an explanation of why there is none).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PageFailure>,
}

impl PageRecord {
    pub fn failed(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        failure: PageFailure,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            truncated: false,
            failure: Some(failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStats {
    pub replies: u64,
    pub retweets: u64,
    pub likes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

/// One social-media post as rendered by a mirror.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub author: String,
    pub handle: String,
    /// Seconds since the unix epoch (UTC).
    pub timestamp_epoch_s: i64,
    pub stats: PostStats,
    pub media: Vec<Media>,
    pub is_reply: bool,
    pub is_retweet: bool,
    pub is_quote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweeted_from_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_from_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_post_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationPost {
    pub id: String,
    pub handle: String,
    pub text: String,
}

/// A single fetched post plus the thread around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub source_date_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_posts: Vec<ConversationPost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            id: "1".to_string(),
            text: "hello".to_string(),
            author: "A".to_string(),
            handle: "a".to_string(),
            timestamp_epoch_s: 10,
            stats: PostStats::default(),
            media: vec![Media {
                kind: MediaKind::Image,
                url: "https://m/pic.jpg".to_string(),
            }],
            is_reply: false,
            is_retweet: false,
            is_quote: false,
            reply_to_handle: None,
            retweeted_from_handle: None,
            quoted_from_handle: None,
            quoted_post_id: None,
        }
    }

    #[test]
    fn post_detail_flattens_post_and_omits_empty_conversation() {
        let d = PostDetail {
            post: post(),
            source_date_text: "Jan 5, 2024 · 3:04 PM UTC".to_string(),
            conversation_posts: Vec::new(),
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["id"].as_str(), Some("1"));
        assert_eq!(v["media"][0]["type"].as_str(), Some("image"));
        assert!(v.get("conversation_posts").is_none());
        assert!(v.get("reply_to_handle").is_none());
    }

    #[test]
    fn page_record_failure_is_tagged_and_optional() {
        let ok = PageRecord {
            url: "https://x".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            truncated: false,
            failure: None,
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v.get("failure").is_none());
        assert!(v.get("truncated").is_none());

        let bad = PageRecord::failed(
            "https://x",
            "Error",
            "HTTP 404",
            PageFailure::HttpStatus { status: 404 },
        );
        let v = serde_json::to_value(&bad).unwrap();
        assert_eq!(v["failure"]["kind"].as_str(), Some("http_status"));
        assert_eq!(v["failure"]["status"].as_u64(), Some(404));
        assert_eq!(bad.failure.as_ref().map(|f| f.code()), Some("http_status"));
    }

    #[test]
    fn fetch_error_display_names_the_kind() {
        let e = Error::fetch(FetchFailureKind::Dns, "no such host");
        assert_eq!(e.to_string(), "fetch failed (dns): no such host");
        assert_eq!(e.code(), "fetch_failed");
        assert_eq!(
            Error::MirrorUnavailable { attempts: 3 }.code(),
            "not_found_or_unavailable"
        );
    }
}
