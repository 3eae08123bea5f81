use rand::Rng;
use std::time::Duration;
use webscout_core::{
    Error, FetchBackend, FetchFailureKind, FetchRequest, FetchResponse, Result,
};

pub mod batch;
pub mod config;
pub mod extract;
pub mod mirror;
pub mod search;
pub mod social;
pub mod tweets;

/// Desktop browser strings; one is picked per request.
pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

pub fn default_user_agents() -> Vec<String> {
    USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

/// Pick a user agent uniformly from `pool` (falls back to the first built-in entry).
pub fn pick_user_agent(pool: &[String]) -> &str {
    if pool.is_empty() {
        return USER_AGENTS[0];
    }
    let i = rand::rng().random_range(0..pool.len());
    &pool[i]
}

/// Shared client settings for every outbound request.
///
/// The user agent is set per request, so it is not part of the client.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("DNT", HeaderValue::from_static("1"));

    reqwest::Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        // Avoid hanging forever on DNS/TLS stalls even if a caller forgets a per-request timeout.
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| Error::fetch(FetchFailureKind::Other, e))
}

/// Map a transport error onto the coarse kinds callers report to users.
pub fn classify_reqwest_error(e: &reqwest::Error) -> FetchFailureKind {
    if e.is_timeout() {
        return FetchFailureKind::Timeout;
    }
    // reqwest does not expose DNS failures directly; look through the source chain.
    let mut src: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(e);
    while let Some(s) = src {
        let msg = s.to_string().to_ascii_lowercase();
        if msg.contains("dns error")
            || msg.contains("failed to lookup address")
            || msg.contains("name or service not known")
            || msg.contains("no such host")
        {
            return FetchFailureKind::Dns;
        }
        src = s.source();
    }
    if e.is_connect() {
        return FetchFailureKind::Connect;
    }
    FetchFailureKind::Other
}

fn fetch_err(e: reqwest::Error) -> Error {
    Error::fetch(classify_reqwest_error(&e), e)
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
}

impl LocalFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            user_agents: default_user_agents(),
        })
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    fn apply_headers(
        &self,
        mut rb: reqwest::RequestBuilder,
        req: &FetchRequest,
    ) -> reqwest::RequestBuilder {
        rb = rb.header(
            reqwest::header::USER_AGENT,
            pick_user_agent(&self.user_agents),
        );
        for (k, v) in &req.headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        rb = self.apply_headers(rb, req);
        let resp = rb.send().await.map_err(fetch_err)?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(fetch_err)?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::test_support::serve;
    use axum::{http::header, http::StatusCode, routing::get, Router};

    #[test]
    fn pick_user_agent_stays_within_pool() {
        let pool = vec!["a".to_string(), "b".to_string()];
        for _ in 0..50 {
            let ua = pick_user_agent(&pool);
            assert!(ua == "a" || ua == "b");
        }
        assert_eq!(pick_user_agent(&[]), USER_AGENTS[0]);
    }

    #[tokio::test]
    async fn local_fetcher_sends_browser_headers() {
        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let ua = headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                let dnt = headers.get("dnt").and_then(|v| v.to_str().ok()).unwrap_or("");
                let lang = headers
                    .get(header::ACCEPT_LANGUAGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if !USER_AGENTS.contains(&ua) {
                    return (StatusCode::BAD_REQUEST, format!("unexpected ua={ua}"));
                }
                (StatusCode::OK, format!("dnt={dnt} lang={lang}"))
            }),
        );
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new(Duration::from_secs(5)).unwrap();
        let resp = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap();
        let body = resp.text_lossy();
        assert_eq!(resp.status, 200, "body={body}");
        assert!(body.contains("dnt=1"));
        assert!(body.contains("lang=en-US"));
    }

    #[tokio::test]
    async fn local_fetcher_caps_body_at_max_bytes() {
        let app = Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "x".repeat(5_000)) }),
        );
        let addr = serve(app).await;

        let fetcher = LocalFetcher::new(Duration::from_secs(5)).unwrap();
        let mut req = FetchRequest::new(format!("http://{addr}/"));
        req.max_bytes = Some(100);
        let resp = fetcher.fetch(&req).await.unwrap();
        assert!(resp.truncated);
        assert_eq!(resp.bytes.len(), 100);
    }

    #[tokio::test]
    async fn local_fetcher_rejects_unparseable_urls_without_io() {
        let fetcher = LocalFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&FetchRequest::new("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_classified_as_connect() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = LocalFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap_err();
        match err {
            Error::Fetch { kind, .. } => assert_eq!(kind, FetchFailureKind::Connect),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
