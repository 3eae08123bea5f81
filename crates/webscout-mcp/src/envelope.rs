//! The uniform result shape of every dispatched tool call.

use serde_json::{json, Value};
use webscout_core::{Error, PageFailure};

pub const SCHEMA_VERSION: u64 = 1;

/// Envelope keys owned by the dispatcher; error context never overwrites them.
const RESERVED_KEYS: [&str; 8] = [
    "ok",
    "error",
    "error_code",
    "suggestion",
    "retryable",
    "schema_version",
    "kind",
    "elapsed_ms",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotFoundOrUnavailable,
    ParseFailed,
    FetchFailed,
    SearchFailed,
    NotConfigured,
    AllFailed,
    UnknownTool,
    UnexpectedError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotFoundOrUnavailable => "not_found_or_unavailable",
            Self::ParseFailed => "parse_failed",
            Self::FetchFailed => "fetch_failed",
            Self::SearchFailed => "search_failed",
            Self::NotConfigured => "not_configured",
            Self::AllFailed => "all_failed",
            Self::UnknownTool => "unknown_tool",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub fn retryable(self) -> bool {
        match self {
            Self::NotFoundOrUnavailable
            | Self::FetchFailed
            | Self::SearchFailed
            | Self::AllFailed
            | Self::ParseFailed => true,
            // Configuration + invalid input are not retryable without changing something.
            Self::InvalidParams
            | Self::InvalidUrl
            | Self::NotConfigured
            | Self::UnknownTool
            | Self::UnexpectedError => false,
        }
    }
}

impl From<&Error> for ErrorCode {
    fn from(e: &Error) -> Self {
        match e {
            Error::InvalidUrl(_) => Self::InvalidUrl,
            Error::InvalidInput(_) => Self::InvalidParams,
            Error::Fetch { .. } => Self::FetchFailed,
            Error::MirrorUnavailable { .. } | Error::NotFoundOrUnavailable(_) => {
                Self::NotFoundOrUnavailable
            }
            Error::ParseFailed(_) => Self::ParseFailed,
            Error::Search(_) => Self::SearchFailed,
            Error::NotConfigured(_) => Self::NotConfigured,
        }
    }
}

impl From<&PageFailure> for ErrorCode {
    fn from(f: &PageFailure) -> Self {
        match f {
            PageFailure::InvalidUrl => Self::InvalidUrl,
            _ => Self::FetchFailed,
        }
    }
}

/// A human-actionable next step for `code`, specialized per tool where it helps.
pub fn suggestion(code: ErrorCode, kind: &str) -> String {
    match code {
        ErrorCode::InvalidParams => match kind {
            "web_search" => "Pass a non-empty query string.".to_string(),
            "web_scrape" => "Pass url as an absolute http(s) URL like https://example.com.".to_string(),
            "multi_scrape" => {
                "Pass urls as a non-empty array of absolute http(s) URLs (at most 3 are read)."
                    .to_string()
            }
            "social_timeline" => {
                "Pass username as a handle like \"jack\" or \"@jack\" (letters, digits, underscores; at most 15)."
                    .to_string()
            }
            "social_post_scrape" => {
                "Pass url as a post link like https://x.com/<user>/status/<id>.".to_string()
            }
            _ => "Check the arguments and retry.".to_string(),
        },
        ErrorCode::InvalidUrl => {
            "Check the URL; only absolute http(s) URLs are supported.".to_string()
        }
        ErrorCode::NotFoundOrUnavailable => {
            "The account or post may not exist, or every mirror is down right now. Check the spelling and retry in a few minutes."
                .to_string()
        }
        ErrorCode::ParseFailed => {
            "The page did not contain the expected post. Check that the URL points to a single post, or retry later."
                .to_string()
        }
        ErrorCode::FetchFailed => {
            "The site could not be read. Retry later or try a different URL.".to_string()
        }
        ErrorCode::SearchFailed => {
            "The search provider failed. Retry later or simplify the query.".to_string()
        }
        ErrorCode::NotConfigured => {
            "Web search is not configured. Set WEBSCOUT_SEARCH_ENDPOINT to a SearXNG-compatible endpoint."
                .to_string()
        }
        ErrorCode::AllFailed => {
            "None of the URLs could be read. Check them one at a time with web_scrape.".to_string()
        }
        ErrorCode::UnknownTool => format!(
            "Use one of: {}.",
            crate::dispatch::TOOL_NAMES.join(", ")
        ),
        ErrorCode::UnexpectedError => {
            "An internal error occurred. Retry; if it keeps happening, report the tool name and arguments."
                .to_string()
        }
    }
}

/// One tool result: `{ok: true, ...data}` or `{ok: false, error, error_code, suggestion, retryable, ...context}`,
/// plus `schema_version`, `kind`, `elapsed_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEnvelope(Value);

fn merge_object(into: &mut Value, from: Value) {
    if let (Some(dst), Value::Object(src)) = (into.as_object_mut(), from) {
        for (k, v) in src {
            if RESERVED_KEYS.contains(&k.as_str()) {
                continue;
            }
            dst.insert(k, v);
        }
    }
}

pub fn add_envelope_fields(payload: &mut Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = json!(SCHEMA_VERSION);
    payload["kind"] = json!(kind);
    payload["elapsed_ms"] = json!(elapsed_ms);
}

impl ToolEnvelope {
    pub fn success(kind: &str, data: Value, elapsed_ms: u128) -> Self {
        let mut payload = json!({ "ok": true });
        merge_object(&mut payload, data);
        add_envelope_fields(&mut payload, kind, elapsed_ms);
        Self(payload)
    }

    pub fn error(
        kind: &str,
        code: ErrorCode,
        message: impl ToString,
        context: Option<Value>,
        elapsed_ms: u128,
    ) -> Self {
        let mut payload = json!({
            "ok": false,
            "error": message.to_string(),
            "error_code": code.as_str(),
            "suggestion": suggestion(code, kind),
            "retryable": code.retryable(),
        });
        if let Some(ctx) = context {
            merge_object(&mut payload, ctx);
        }
        add_envelope_fields(&mut payload, kind, elapsed_ms);
        Self(payload)
    }

    pub fn is_ok(&self) -> bool {
        self.0["ok"].as_bool().unwrap_or(false)
    }

    pub fn error_code(&self) -> Option<&str> {
        self.0["error_code"].as_str()
    }

    pub fn kind(&self) -> Option<&str> {
        self.0["kind"].as_str()
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    /// Compact JSON, for inclusion in a model prompt.
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}

impl std::ops::Index<&str> for ToolEnvelope {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        &self.0[key]
    }
}
