//! Tool Dispatcher: capability name + JSON arguments → one [`ToolEnvelope`].
//!
//! Every capability runs inside its own fault boundary (`catch_unwind`), so neither a lower
//! layer error nor a panic escapes `dispatch`.

use crate::envelope::{ErrorCode, ToolEnvelope};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use webscout_core::{Error, SearchProvider, SearchQuery};
use webscout_local::batch::{BatchCoordinator, BatchItem, MAX_BATCH_URLS};
use webscout_local::config::{ExtractConfig, MirrorConfig, SearchConfig};
use webscout_local::extract::PageExtractor;
use webscout_local::search::SearxngSearchProvider;
use webscout_local::social::{normalize_handle, SocialFetcher, MAX_TIMELINE_POSTS};

pub const MAX_SEARCH_RESULTS: usize = 5;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

pub const TOOLS: [ToolSpec; 5] = [
    ToolSpec {
        name: "web_search",
        description: "Search the web; returns up to 5 results (url, title, snippet).",
    },
    ToolSpec {
        name: "web_scrape",
        description: "Fetch one web page and return its main readable text.",
    },
    ToolSpec {
        name: "multi_scrape",
        description: "Read up to 3 URLs concurrently; social post URLs are summarized, other pages extracted.",
    },
    ToolSpec {
        name: "social_timeline",
        description: "Recent posts (up to 10, newest first) for a social-media username.",
    },
    ToolSpec {
        name: "social_post_scrape",
        description: "One social-media post by URL, with the conversation around it.",
    },
];

pub const TOOL_NAMES: [&str; 5] = [
    TOOLS[0].name,
    TOOLS[1].name,
    TOOLS[2].name,
    TOOLS[3].name,
    TOOLS[4].name,
];

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct WebSearchArgs {
    /// Search query.
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct WebScrapeArgs {
    /// Absolute http(s) URL.
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct MultiScrapeArgs {
    /// URLs to read; only the first 3 are processed.
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct SocialTimelineArgs {
    /// Handle, with or without a leading `@`.
    pub username: Option<String>,
    /// Also read the "with replies" feed (default false).
    pub include_replies: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct SocialPostScrapeArgs {
    /// Post URL such as https://x.com/<user>/status/<id>.
    pub url: Option<String>,
}

/// A capability failure before it is shaped into an envelope.
#[derive(Debug)]
struct Failure {
    code: ErrorCode,
    message: String,
    context: Option<Value>,
}

impl Failure {
    fn new(code: ErrorCode, message: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
            context: None,
        }
    }

    fn invalid(message: impl ToString) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    fn with_context(mut self, ctx: Value) -> Self {
        self.context = Some(ctx);
        self
    }
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Self::new(ErrorCode::from(&e), e)
    }
}

type Outcome = std::result::Result<Value, Failure>;

fn parse_args<T: for<'de> Deserialize<'de> + Default>(args: Value) -> Result<T, Failure> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| Failure::invalid(format!("invalid arguments: {e}")))
}

fn required(v: Option<String>, name: &str) -> Result<String, Failure> {
    v.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Failure::invalid(format!("{name} must be a non-empty string")))
}

fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn batch_item_json(item: &BatchItem) -> Value {
    match &item.outcome {
        Ok(rec) => json!({
            "url": item.url,
            "ok": true,
            "title": rec.title,
            "content": rec.content,
            "truncated": rec.truncated,
        }),
        Err(e) => json!({
            "url": item.url,
            "ok": false,
            "error_code": e.code,
            "error": e.message,
        }),
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    pages: PageExtractor,
    social: SocialFetcher,
    batch: BatchCoordinator,
    search: Arc<dyn SearchProvider>,
}

impl Dispatcher {
    pub fn new(
        mirrors: MirrorConfig,
        extract: ExtractConfig,
        search: SearchConfig,
    ) -> webscout_core::Result<Self> {
        let pages = PageExtractor::new(extract)?;
        let social = SocialFetcher::new(mirrors)?;
        let batch = BatchCoordinator::new(pages.clone(), social.clone());
        Ok(Self {
            pages,
            social,
            batch,
            search: Arc::new(SearxngSearchProvider::new(&search)?),
        })
    }

    pub fn from_env() -> webscout_core::Result<Self> {
        Self::new(
            MirrorConfig::from_env(),
            ExtractConfig::from_env(),
            SearchConfig::from_env(),
        )
    }

    /// Replace the search backend (any [`SearchProvider`]).
    pub fn with_search_provider(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = search;
        self
    }

    /// Run one capability. Always returns an envelope; never panics outward.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolEnvelope {
        let t0 = Instant::now();
        if !TOOL_NAMES.contains(&name) {
            warn!(tool = name, "unknown tool requested");
            return ToolEnvelope::error(
                name,
                ErrorCode::UnknownTool,
                format!("unknown tool: {name:?}"),
                Some(json!({ "available_tools": TOOL_NAMES })),
                t0.elapsed().as_millis(),
            );
        }

        let work = async {
            match name {
                "web_search" => self.web_search(args).await,
                "web_scrape" => self.web_scrape(args).await,
                "multi_scrape" => self.multi_scrape(args).await,
                "social_timeline" => self.social_timeline(args).await,
                _ => self.social_post_scrape(args).await,
            }
        };
        let outcome = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(o) => o,
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(tool = name, panic = %msg, "tool panicked");
                Err(Failure::new(
                    ErrorCode::UnexpectedError,
                    format!("internal error: {msg}"),
                ))
            }
        };

        let elapsed = t0.elapsed().as_millis();
        match outcome {
            Ok(data) => ToolEnvelope::success(name, data, elapsed),
            Err(f) => {
                debug!(tool = name, code = f.code.as_str(), error = %f.message, "tool failed");
                ToolEnvelope::error(name, f.code, f.message, f.context, elapsed)
            }
        }
    }

    async fn web_search(&self, args: Value) -> Outcome {
        let args: WebSearchArgs = parse_args(args)?;
        let query = required(args.query, "query")?;
        let resp = self
            .search
            .search(&SearchQuery {
                query: query.clone(),
                max_results: Some(MAX_SEARCH_RESULTS),
                language: None,
                timeout_ms: None,
            })
            .await
            .map_err(|e| Failure::from(e).with_context(json!({ "query": query })))?;
        let results: Vec<Value> = resp
            .results
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|r| json!({ "url": r.url, "title": r.title, "snippet": r.snippet }))
            .collect();
        Ok(json!({
            "query": query,
            "provider": resp.provider,
            "count": results.len(),
            "results": results,
        }))
    }

    async fn web_scrape(&self, args: Value) -> Outcome {
        let args: WebScrapeArgs = parse_args(args)?;
        let url = required(args.url, "url")?;
        let rec = self.pages.extract(&url).await;
        match &rec.failure {
            None => Ok(json!({
                "url": rec.url,
                "title": rec.title,
                "content": rec.content,
                "truncated": rec.truncated,
            })),
            Some(f) => {
                let code = ErrorCode::from(f);
                let ctx = serde_json::to_value(&rec).unwrap_or(Value::Null);
                Err(Failure::new(code, &rec.content).with_context(ctx))
            }
        }
    }

    async fn multi_scrape(&self, args: Value) -> Outcome {
        let args: MultiScrapeArgs = parse_args(args)?;
        let urls: Vec<String> = args
            .urls
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(Failure::invalid("urls must contain at least one URL"));
        }
        let skipped: Vec<&String> = urls.iter().skip(MAX_BATCH_URLS).collect();
        let items = self.batch.extract_many(&urls).await?;
        let succeeded = items.iter().filter(|i| i.is_ok()).count();
        let failed = items.len() - succeeded;
        let results: Vec<Value> = items.iter().map(batch_item_json).collect();

        if succeeded == 0 {
            return Err(Failure::new(
                ErrorCode::AllFailed,
                format!("all {failed} URLs failed"),
            )
            .with_context(json!({ "results": results, "skipped_urls": skipped })));
        }
        Ok(json!({
            "results": results,
            "succeeded": succeeded,
            "failed": failed,
            "skipped_urls": skipped,
        }))
    }

    async fn social_timeline(&self, args: Value) -> Outcome {
        let args: SocialTimelineArgs = parse_args(args)?;
        let raw = required(args.username, "username")?;
        let username = normalize_handle(&raw)?;
        let include_replies = args.include_replies.unwrap_or(false);
        let mut posts = self
            .social
            .fetch_timeline(&username, include_replies)
            .await
            .map_err(|e| Failure::from(e).with_context(json!({ "username": username })))?;
        posts.truncate(MAX_TIMELINE_POSTS);
        Ok(json!({
            "username": username,
            "include_replies": include_replies,
            "count": posts.len(),
            "posts": posts,
        }))
    }

    async fn social_post_scrape(&self, args: Value) -> Outcome {
        let args: SocialPostScrapeArgs = parse_args(args)?;
        let url = required(args.url, "url")?;
        let detail = self
            .social
            .fetch_by_url(&url)
            .await
            .map_err(|e| Failure::from(e).with_context(json!({ "url": url })))?;
        Ok(json!({ "url": url, "post": detail }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;
    use std::time::Duration;
    use webscout_core::{SearchResponse, SearchResult};

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn dead_base() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn dispatcher(mirrors: Vec<String>) -> Dispatcher {
        let mut m = MirrorConfig::direct(mirrors);
        m.timeout = Duration::from_secs(5);
        let e = ExtractConfig {
            timeout: Duration::from_secs(5),
            ..ExtractConfig::default()
        };
        Dispatcher::new(m, e, SearchConfig::default()).unwrap()
    }

    struct FixedSearch(usize);

    #[async_trait::async_trait]
    impl SearchProvider for FixedSearch {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(&self, q: &SearchQuery) -> webscout_core::Result<SearchResponse> {
            Ok(SearchResponse {
                results: (0..self.0)
                    .map(|i| SearchResult {
                        url: format!("https://r.example/{i}?q={}", q.query),
                        title: Some(format!("r{i}")),
                        snippet: None,
                        source: "fixed".to_string(),
                    })
                    .collect(),
                provider: "fixed".to_string(),
                timings_ms: Default::default(),
            })
        }
    }

    struct PanickingSearch;

    #[async_trait::async_trait]
    impl SearchProvider for PanickingSearch {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn search(&self, _q: &SearchQuery) -> webscout_core::Result<SearchResponse> {
            panic!("provider exploded")
        }
    }

    fn timeline_item(id: u32) -> String {
        format!(
            r#"<div class="timeline-item"><a class="tweet-link" href="/jack/status/{id}#m"></a>
<div class="tweet-header"><a class="fullname">Jack</a><a class="username">@jack</a>
<span class="tweet-date"><a title="Jan {day}, 2024 · 1:00 PM UTC">x</a></span></div>
<div class="tweet-content">post {id}</div></div>"#,
            day = id % 28 + 1
        )
    }

    #[tokio::test]
    async fn unknown_tool_gets_a_list_of_valid_names() {
        let d = dispatcher(vec![dead_base().await]);
        let e = d.dispatch("web_crawl", json!({})).await;
        assert!(!e.is_ok());
        assert_eq!(e.error_code(), Some("unknown_tool"));
        assert!(e["suggestion"].as_str().unwrap().contains("social_post_scrape"));
        assert_eq!(e["available_tools"].as_array().map(|a| a.len()), Some(5));
    }

    #[tokio::test]
    async fn exhausted_mirrors_yield_not_found_envelopes() {
        let d = dispatcher(vec![dead_base().await, dead_base().await]);
        let e = d
            .dispatch("social_timeline", json!({ "username": "@jack" }))
            .await;
        assert_eq!(e.error_code(), Some("not_found_or_unavailable"));
        assert_eq!(e["username"], "jack");
        assert_eq!(e["retryable"], true);

        let e = d
            .dispatch(
                "social_post_scrape",
                json!({ "url": "https://x.com/jack/status/1" }),
            )
            .await;
        assert_eq!(e.error_code(), Some("not_found_or_unavailable"));
        assert_eq!(e.kind(), Some("social_post_scrape"));
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_without_io() {
        let d = dispatcher(vec![dead_base().await]);
        let cases = [
            ("social_timeline", json!({})),
            ("social_timeline", json!({ "username": "has space" })),
            ("social_post_scrape", json!({ "url": "https://example.com/a/status/1" })),
            ("web_scrape", json!({ "url": "   " })),
            ("web_scrape", json!({ "url": 42 })),
            ("multi_scrape", json!({ "urls": [] })),
            ("web_search", Value::Null),
        ];
        for (tool, args) in cases {
            let e = d.dispatch(tool, args).await;
            assert_eq!(e.error_code(), Some("invalid_params"), "{tool}: {}", e.to_text());
            assert_eq!(e["retryable"], false);
        }
        let e = d.dispatch("web_scrape", json!({ "url": "ftp://x/y" })).await;
        assert_eq!(e.error_code(), Some("invalid_url"));
    }

    #[tokio::test]
    async fn search_results_are_capped_and_missing_endpoint_is_reported() {
        let d = dispatcher(vec![dead_base().await]);
        let e = d.dispatch("web_search", json!({ "query": "rust" })).await;
        assert_eq!(e.error_code(), Some("not_configured"));

        let d = d.with_search_provider(Arc::new(FixedSearch(8)));
        let e = d.dispatch("web_search", json!({ "query": "rust" })).await;
        assert!(e.is_ok(), "{}", e.to_text());
        assert_eq!(e["results"].as_array().map(|a| a.len()), Some(MAX_SEARCH_RESULTS));
        assert_eq!(e["count"], MAX_SEARCH_RESULTS);
    }

    #[tokio::test]
    async fn panics_become_unexpected_error_envelopes() {
        let d = dispatcher(vec![dead_base().await]).with_search_provider(Arc::new(PanickingSearch));
        let e = d.dispatch("web_search", json!({ "query": "boom" })).await;
        assert_eq!(e.error_code(), Some("unexpected_error"));
        assert!(e["error"].as_str().unwrap().contains("provider exploded"));
    }

    #[tokio::test]
    async fn timeline_is_capped_at_ten_newest_first() {
        let page = format!(
            "<html><body>{}</body></html>",
            (1..=15).map(timeline_item).collect::<Vec<_>>().join("\n")
        );
        let app = Router::new().route("/jack", get(move || async move { axum::response::Html(page) }));
        let addr = serve(app).await;
        let d = dispatcher(vec![format!("http://{addr}")]);
        let e = d.dispatch("social_timeline", json!({ "username": "jack" })).await;
        assert!(e.is_ok(), "{}", e.to_text());
        let posts = e["posts"].as_array().unwrap();
        assert_eq!(posts.len(), 10);
        assert_eq!(posts[0]["id"], "15");
        assert_eq!(e["count"], 10);
    }

    #[tokio::test]
    async fn web_scrape_failures_carry_the_page_record() {
        let app = Router::new().route(
            "/",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let addr = serve(app).await;
        let d = dispatcher(vec![dead_base().await]);
        let e = d
            .dispatch("web_scrape", json!({ "url": format!("http://{addr}/") }))
            .await;
        assert_eq!(e.error_code(), Some("fetch_failed"));
        assert_eq!(e["title"], "Error");
        assert_eq!(e["failure"]["status"], 503);
    }

    #[tokio::test]
    async fn multi_scrape_distinguishes_partial_from_total_failure() {
        let body = "readable words ".repeat(20);
        let app = Router::new().route(
            "/ok",
            get(move || async move {
                axum::response::Html(format!("<html><body><main><p>{body}</p></main></body></html>"))
            }),
        );
        let addr = serve(app).await;
        let dead = dead_base().await;
        let d = dispatcher(vec![dead.clone()]);

        let e = d
            .dispatch(
                "multi_scrape",
                json!({ "urls": [format!("http://{addr}/ok"), format!("{dead}/x"), "not a url", "https://extra.example/"] }),
            )
            .await;
        assert!(e.is_ok(), "{}", e.to_text());
        assert_eq!(e["succeeded"], 1);
        assert_eq!(e["failed"], 2);
        assert_eq!(e["results"].as_array().map(|a| a.len()), Some(3));
        assert_eq!(e["skipped_urls"][0], "https://extra.example/");
        assert_eq!(e["results"][2]["error_code"], "invalid_url");

        let e = d
            .dispatch("multi_scrape", json!({ "urls": ["not a url", format!("{dead}/y")] }))
            .await;
        assert_eq!(e.error_code(), Some("all_failed"));
        assert_eq!(e["results"].as_array().map(|a| a.len()), Some(2));
    }
}
