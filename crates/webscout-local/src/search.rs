use crate::config::SearchConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use webscout_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};

fn timeout_ms_from_query(q: &SearchQuery, default_ms: u64) -> u64 {
    // Keep a conservative cap even if callers pass something huge.
    q.timeout_ms.unwrap_or(default_ms).clamp(1_000, 60_000)
}

/// SearXNG-compatible JSON search. A missing endpoint is reported per call, not at startup.
#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: Option<String>,
    default_timeout_ms: u64,
    user_agents: Vec<String>,
}

impl SearxngSearchProvider {
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let timeout = cfg.timeout.unwrap_or(Duration::from_secs(20));
        Ok(Self {
            client: crate::http_client(timeout)?,
            endpoint: cfg.endpoint.clone(),
            default_timeout_ms: timeout.as_millis() as u64,
            user_agents: cfg.user_agents.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Accept either a base URL or a full `/search` endpoint.
    fn endpoint_search_for(base_endpoint: &str) -> String {
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

fn map_results(parsed: SearxngSearchResponse, max_results: usize) -> Vec<SearchResult> {
    parsed
        .results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| {
            let url = r.url.filter(|u| !u.trim().is_empty())?;
            Some(SearchResult {
                url,
                title: r.title,
                snippet: r.content,
                source: "searxng".to_string(),
            })
        })
        .take(max_results)
        .collect()
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let Some(base) = self.endpoint.as_deref() else {
            return Err(Error::NotConfigured(
                "missing WEBSCOUT_SEARCH_ENDPOINT".to_string(),
            ));
        };
        if q.query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10).min(20);

        let mut req = self
            .client
            .get(Self::endpoint_search_for(base))
            .header(
                reqwest::header::USER_AGENT,
                crate::pick_user_agent(&self.user_agents),
            )
            .query(&[("q", q.query.as_str()), ("format", "json")]);
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("language", lang)]);
        }

        let resp = req
            .timeout(Duration::from_millis(timeout_ms_from_query(
                q,
                self.default_timeout_ms,
            )))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }
        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results: map_results(parsed, max_results),
            provider: "searxng".to_string(),
            timings_ms,
        })
    }
}
