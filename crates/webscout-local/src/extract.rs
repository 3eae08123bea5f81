//! Generic page extraction: fetch a URL and reduce it to its main readable text.
//!
//! `PageExtractor::extract` never returns an error. Every failure path (bad URL, timeout, DNS,
//! non-2xx, non-HTML) produces a `PageRecord` whose `content` explains what went wrong and
//! whose `failure` tags it.

use crate::config::ExtractConfig;
use crate::LocalFetcher;
use html_scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use webscout_core::{Error, FetchBackend, FetchFailureKind, FetchRequest, PageFailure, PageRecord};

/// Tried in order; the first candidate whose text exceeds the minimum length wins.
pub const MAIN_CONTENT_SELECTORS: [&str; 10] = [
    "main",
    "article",
    "[role=\"main\"]",
    "#main-content",
    ".main-content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "#content",
    ".content",
];

/// Elements dropped wholesale before any text is read.
pub const BOILERPLATE_TAGS: [&str; 9] = [
    "nav", "header", "footer", "script", "style", "aside", "noscript", "iframe", "form",
];

/// Structural UI words. An element is dropped when one of its class/id tokens (split on
/// whitespace, `-`, and `_`) equals a marker, so `site-nav` matches and `uploads` does not.
pub const BOILERPLATE_MARKERS: [&str; 17] = [
    "nav",
    "navbar",
    "navigation",
    "menu",
    "sidebar",
    "footer",
    "header",
    "banner",
    "cookie",
    "consent",
    "ad",
    "ads",
    "advert",
    "advertisement",
    "promo",
    "subscribe",
    "newsletter",
];

const FALLBACK_BLOCKS: &str = "p, h1, h2, h3, h4, h5, h6";

const BLOCK_TAGS: [&str; 27] = [
    "p", "div", "section", "article", "main", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5",
    "h6", "br", "tr", "td", "th", "table", "blockquote", "pre", "figure", "figcaption", "dl",
    "dt", "dd", "hr",
];

pub const TITLE_PLACEHOLDER: &str = "Untitled";
pub const NON_HTML_TITLE: &str = "Non-HTML content";
pub const ERROR_TITLE: &str = "Error";
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

fn class_or_id_lc(el: &ElementRef<'_>) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    out.to_ascii_lowercase()
}

fn has_marker_token(class_or_id: &str) -> bool {
    class_or_id
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|t| !t.is_empty())
        .any(|t| BOILERPLATE_MARKERS.contains(&t))
}

pub fn is_boilerplate(el: &ElementRef<'_>) -> bool {
    let name = el.value().name();
    if BOILERPLATE_TAGS.contains(&name) {
        return true;
    }
    has_marker_token(&class_or_id_lc(el))
}

enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    Break,
}

/// Text under `root`, skipping boilerplate subtrees; block elements become line breaks.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Enter(root)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Text(t) => out.push_str(t),
            Step::Break => out.push('\n'),
            Step::Enter(el) => {
                let block = BLOCK_TAGS.contains(&el.value().name());
                if block {
                    out.push('\n');
                    stack.push(Step::Break);
                }
                let children: Vec<_> = el.children().collect();
                for child in children.into_iter().rev() {
                    if let Some(t) = child.value().as_text() {
                        stack.push(Step::Text(&**t));
                    } else if let Some(c) = ElementRef::wrap(child) {
                        if !is_boilerplate(&c) {
                            stack.push(Step::Enter(c));
                        }
                    }
                }
            }
        }
    }
    out
}

/// Collapse runs of spaces within a line and runs of blank lines to a single blank line.
pub fn normalize_whitespace(s: &str) -> String {
    let mut out = String::new();
    let mut pending_blank = false;
    for line in s.lines() {
        let l = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if l.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        pending_blank = false;
        out.push_str(&l);
    }
    out
}

fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => (s[..byte].to_string(), true),
        None => (s.to_string(), false),
    }
}

fn title_of(doc: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next().map(|t| t.text().collect::<String>()))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| TITLE_PLACEHOLDER.to_string())
}

fn main_candidate(doc: &Html, min_chars: usize) -> Option<String> {
    for s in MAIN_CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(s) else {
            continue;
        };
        for el in doc.select(&sel) {
            if is_boilerplate(&el) {
                continue;
            }
            let text = normalize_whitespace(&visible_text(el));
            if text.chars().count() > min_chars {
                return Some(text);
            }
        }
    }
    None
}

fn block_fallback(doc: &Html, min_chars: usize) -> Option<String> {
    let sel = Selector::parse(FALLBACK_BLOCKS).ok()?;
    let parts: Vec<String> = doc
        .select(&sel)
        .filter(|el| !el.ancestors().filter_map(ElementRef::wrap).any(|a| is_boilerplate(&a)))
        .map(|el| normalize_whitespace(&visible_text(el)))
        .filter(|t| !t.is_empty())
        .collect();
    let text = parts.join("\n\n");
    (text.chars().count() > min_chars).then_some(text)
}

fn body_text(doc: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .unwrap_or_else(|| doc.root_element());
    normalize_whitespace(&visible_text(root))
}

/// Pure HTML → `PageRecord` step (no IO).
pub fn extract_from_html(html: &str, url: &str, cfg: &ExtractConfig) -> PageRecord {
    let doc = Html::parse_document(html);
    let title = title_of(&doc);
    let text = main_candidate(&doc, cfg.min_content_chars)
        .or_else(|| block_fallback(&doc, cfg.min_content_chars))
        .unwrap_or_else(|| body_text(&doc));
    let (mut content, truncated) = truncate_chars(&text, cfg.max_chars);
    if truncated {
        content.push_str(TRUNCATION_MARKER);
    }
    PageRecord {
        url: url.to_string(),
        title,
        content,
        truncated,
        failure: None,
    }
}

fn is_html_content_type(ct: &str) -> bool {
    let ct = ct.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

#[derive(Clone)]
pub struct PageExtractor {
    fetcher: Arc<dyn FetchBackend>,
    config: ExtractConfig,
}

impl PageExtractor {
    pub fn new(config: ExtractConfig) -> webscout_core::Result<Self> {
        let fetcher =
            LocalFetcher::new(config.timeout)?.with_user_agents(config.user_agents.clone());
        Ok(Self::with_fetcher(Arc::new(fetcher), config))
    }

    pub fn with_fetcher(fetcher: Arc<dyn FetchBackend>, config: ExtractConfig) -> Self {
        Self { fetcher, config }
    }

    pub async fn extract(&self, url: &str) -> PageRecord {
        let url = url.trim();
        match url::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => {
                return PageRecord::failed(
                    url,
                    ERROR_TITLE,
                    format!("Invalid URL: scheme {:?} is not supported; use http or https.", u.scheme()),
                    PageFailure::InvalidUrl,
                );
            }
            Err(e) => {
                return PageRecord::failed(
                    url,
                    ERROR_TITLE,
                    format!("Invalid URL {url:?}: {e}."),
                    PageFailure::InvalidUrl,
                );
            }
        }

        let mut req = FetchRequest::new(url);
        req.timeout_ms = Some(self.config.timeout.as_millis() as u64);
        req.max_bytes = Some(self.config.max_bytes);

        let resp = match self.fetcher.fetch(&req).await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "page fetch failed");
                return self.failure_record(url, e);
            }
        };

        if !resp.is_success() {
            return PageRecord::failed(
                url,
                ERROR_TITLE,
                format!("The server returned HTTP {} for {url}.", resp.status),
                PageFailure::HttpStatus {
                    status: resp.status,
                },
            );
        }

        if let Some(ct) = resp.content_type.as_deref() {
            if !is_html_content_type(ct) {
                return PageRecord::failed(
                    url,
                    NON_HTML_TITLE,
                    format!("{url} returned {ct}, which is not an HTML page; no text was extracted."),
                    PageFailure::NonHtml {
                        content_type: ct.to_string(),
                    },
                );
            }
        }

        let mut rec = extract_from_html(&resp.text_lossy(), url, &self.config);
        // Body cut at `max_bytes`: same marker as the character cap, added once.
        if resp.truncated && !rec.truncated {
            rec.content.push_str(TRUNCATION_MARKER);
            rec.truncated = true;
        }
        rec
    }

    fn failure_record(&self, url: &str, e: Error) -> PageRecord {
        match e {
            Error::InvalidUrl(msg) => PageRecord::failed(
                url,
                ERROR_TITLE,
                format!("Invalid URL {url:?}: {msg}."),
                PageFailure::InvalidUrl,
            ),
            Error::Fetch { kind, message } => {
                let content = match kind {
                    FetchFailureKind::Timeout => format!(
                        "Timed out after {}s fetching {url}. The site may be slow or down.",
                        self.config.timeout.as_secs_f64()
                    ),
                    FetchFailureKind::Dns => {
                        format!("Could not resolve the host for {url}. Check the domain name.")
                    }
                    FetchFailureKind::Connect => {
                        format!("Could not connect to {url}: {message}")
                    }
                    FetchFailureKind::Other => format!("Failed to fetch {url}: {message}"),
                };
                PageRecord::failed(url, ERROR_TITLE, content, kind.into())
            }
            other => PageRecord::failed(
                url,
                ERROR_TITLE,
                format!("Failed to fetch {url}: {other}"),
                PageFailure::Fetch,
            ),
        }
    }
}
