//! Fetch documents from a ranked list of interchangeable mirrors.
//!
//! The cascade is an explicit ordered list of `(mirror, transport)` pairs: for each mirror,
//! every proxy in order, then a direct request. Attempts and the sub-requests inside them run
//! one at a time, and the first attempt that resolves *all* sub-requests with a non-empty body
//! wins. Nothing is remembered between
//! calls; every call walks the list from the top.

use crate::config::MirrorConfig;
use tracing::{debug, info, warn};
use webscout_core::{Error, Result};

/// How one attempt reaches a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Rewriting proxy: target URL is percent-encoded and appended to this prefix.
    Proxy(String),
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub mirror: String,
    pub transport: Transport,
}

impl Attempt {
    pub fn url_for(&self, path: &str) -> String {
        let target = format!("{}{}", self.mirror.trim_end_matches('/'), path);
        match &self.transport {
            Transport::Direct => target,
            Transport::Proxy(prefix) => {
                let enc: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
                format!("{prefix}{enc}")
            }
        }
    }
}

/// Logical sub-requests issued against each mirror (paths relative to the mirror root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    paths: Vec<String>,
}

impl RequestPlan {
    pub fn single(path: impl Into<String>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }

    pub fn with(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// Every `(mirror, transport)` pair in the order they are tried.
pub fn cascade_plan(cfg: &MirrorConfig) -> Vec<Attempt> {
    let mut out = Vec::with_capacity(cfg.mirrors.len() * (cfg.proxies.len() + 1));
    for mirror in &cfg.mirrors {
        for proxy in &cfg.proxies {
            out.push(Attempt {
                mirror: mirror.clone(),
                transport: Transport::Proxy(proxy.clone()),
            });
        }
        out.push(Attempt {
            mirror: mirror.clone(),
            transport: Transport::Direct,
        });
    }
    out
}

#[derive(Debug, Clone)]
pub enum CascadeOutcome {
    /// One document per plan path, in plan order.
    Success {
        documents: Vec<String>,
        mirror: String,
    },
    Exhausted {
        attempts: usize,
    },
}

#[derive(Debug, Clone)]
pub struct MirrorDocuments {
    pub documents: Vec<String>,
    /// Base URL of the mirror that served them (used to absolutize relative media URLs).
    pub mirror: String,
}

#[derive(Debug, Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    config: MirrorConfig,
}

impl MirrorClient {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(config.timeout)?,
            config,
        })
    }

    async fn get_text(&self, url: &str) -> std::result::Result<String, String> {
        let resp = self
            .client
            .get(url)
            .header(
                reqwest::header::USER_AGENT,
                crate::pick_user_agent(&self.config.user_agents),
            )
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| format!("{} error: {e}", crate::classify_reqwest_error(&e).as_str()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        let body = resp.text().await.map_err(|e| e.to_string())?;
        if body.trim().is_empty() {
            return Err("empty body".to_string());
        }
        Ok(body)
    }

    /// Sub-requests go out one at a time, in plan order; the first failure ends the attempt.
    async fn run_attempt(
        &self,
        attempt: &Attempt,
        plan: &RequestPlan,
    ) -> std::result::Result<Vec<String>, String> {
        let mut documents = Vec::with_capacity(plan.paths().len());
        for path in plan.paths() {
            let url = attempt.url_for(path);
            let body = self
                .get_text(&url)
                .await
                .map_err(|reason| format!("{path}: {reason}"))?;
            documents.push(body);
        }
        Ok(documents)
    }

    /// Walk the cascade until one attempt satisfies the whole plan.
    pub async fn cascade(&self, plan: &RequestPlan) -> CascadeOutcome {
        let attempts = cascade_plan(&self.config);
        let total = attempts.len();
        for (i, attempt) in attempts.iter().enumerate() {
            match self.run_attempt(attempt, plan).await {
                Ok(documents) => {
                    info!(
                        mirror = %attempt.mirror,
                        via_proxy = matches!(attempt.transport, Transport::Proxy(_)),
                        attempt = i + 1,
                        "mirror fetch succeeded"
                    );
                    return CascadeOutcome::Success {
                        documents,
                        mirror: attempt.mirror.clone(),
                    };
                }
                Err(reason) => {
                    debug!(
                        mirror = %attempt.mirror,
                        transport = ?attempt.transport,
                        attempt = i + 1,
                        total,
                        %reason,
                        "mirror attempt failed"
                    );
                }
            }
        }
        warn!(attempts = total, paths = ?plan.paths(), "all mirrors exhausted");
        CascadeOutcome::Exhausted { attempts: total }
    }

    /// Cascade, flattened into a `Result`; exhaustion becomes `Error::MirrorUnavailable`.
    pub async fn fetch_through_mirrors(&self, plan: &RequestPlan) -> Result<MirrorDocuments> {
        if plan.paths().is_empty() {
            return Err(Error::InvalidInput("empty request plan".to_string()));
        }
        match self.cascade(plan).await {
            CascadeOutcome::Success { documents, mirror } => {
                Ok(MirrorDocuments { documents, mirror })
            }
            CascadeOutcome::Exhausted { attempts } => Err(Error::MirrorUnavailable { attempts }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;
    use std::net::SocketAddr;

    pub async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// A base URL with nothing listening behind it.
    pub async fn dead_base() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }
}
