//! Concurrent multi-URL extraction with per-item failure isolation.

use crate::extract::PageExtractor;
use crate::social::{post_summary, SocialFetcher};
use futures_util::future::join_all;
use tracing::{info, warn};
use webscout_core::{Error, PageRecord, Result};

pub const MAX_BATCH_URLS: usize = 3;

/// Why one batch item produced no content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub code: &'static str,
    pub message: String,
}

impl From<Error> for ItemError {
    fn from(e: Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub url: String,
    pub outcome: std::result::Result<PageRecord, ItemError>,
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Clone)]
pub struct BatchCoordinator {
    pages: PageExtractor,
    social: SocialFetcher,
}

impl BatchCoordinator {
    pub fn new(pages: PageExtractor, social: SocialFetcher) -> Self {
        Self { pages, social }
    }

    /// Extract the first [`MAX_BATCH_URLS`] URLs concurrently; results keep input order.
    ///
    /// Only an empty input is an error. Individual failures are reported per item.
    pub async fn extract_many(&self, urls: &[String]) -> Result<Vec<BatchItem>> {
        if urls.is_empty() {
            return Err(Error::InvalidInput("urls must not be empty".to_string()));
        }
        if urls.len() > MAX_BATCH_URLS {
            info!(
                requested = urls.len(),
                kept = MAX_BATCH_URLS,
                "batch truncated to the maximum size"
            );
        }
        let futs = urls
            .iter()
            .take(MAX_BATCH_URLS)
            .map(|url| self.extract_one(url));
        let items = join_all(futs).await;

        for item in items.iter().filter(|i| !i.is_ok()) {
            if let Err(e) = &item.outcome {
                warn!(url = %item.url, code = e.code, error = %e.message, "batch item failed");
            }
        }
        Ok(items)
    }

    async fn extract_one(&self, url: &str) -> BatchItem {
        let outcome = if self.social.is_social_url(url) {
            self.social
                .fetch_by_url(url)
                .await
                .map(|d| PageRecord {
                    url: url.to_string(),
                    title: format!("Post by @{}", d.post.handle),
                    content: post_summary(&d),
                    truncated: false,
                    failure: None,
                })
                .map_err(ItemError::from)
        } else {
            let rec = self.pages.extract(url).await;
            match &rec.failure {
                None => Ok(rec),
                Some(f) => Err(ItemError {
                    code: f.code(),
                    message: rec.content.clone(),
                }),
            }
        };
        BatchItem {
            url: url.to_string(),
            outcome,
        }
    }
}
