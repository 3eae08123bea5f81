//! "Recent posts for a user" and "one post by URL", composed from the mirror cascade and the
//! post parsers.

use crate::config::MirrorConfig;
use crate::mirror::{MirrorClient, RequestPlan};
use crate::tweets::PostParser;
use std::collections::HashSet;
use std::sync::Arc;
use webscout_core::{Error, Post, PostDetail, Result};

pub const MAX_TIMELINE_POSTS: usize = 10;
pub const MAX_HANDLE_LEN: usize = 15;

/// Hosts whose post URLs are routed through the mirrors.
pub const SOCIAL_HOSTS: [&str; 6] = [
    "twitter.com",
    "x.com",
    "mobile.twitter.com",
    "mobile.x.com",
    "www.twitter.com",
    "www.x.com",
];

/// Strip a leading `@` and check the handle shape (1-15 of `[A-Za-z0-9_]`).
pub fn normalize_handle(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let h = trimmed.strip_prefix('@').unwrap_or(trimmed);
    if h.is_empty() || h.len() > MAX_HANDLE_LEN {
        return Err(Error::InvalidInput(format!(
            "username must be 1-{MAX_HANDLE_LEN} characters: {raw:?}"
        )));
    }
    if !h.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidInput(format!(
            "username may only contain letters, digits, and underscores: {raw:?}"
        )));
    }
    Ok(h.to_string())
}

/// A post URL on a known social host, split into `(handle, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUrl {
    pub handle: String,
    pub id: String,
}

impl PostUrl {
    pub fn path(&self) -> String {
        format!("/{}/status/{}", self.handle, self.id)
    }
}

fn is_social_host(host: &str, extra_hosts: &[String]) -> bool {
    SOCIAL_HOSTS.contains(&host) || extra_hosts.iter().any(|h| h == host)
}

/// Host-only check used for routing; does not require a post path.
pub fn is_social_url(raw: &str, extra_hosts: &[String]) -> bool {
    url::Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .is_some_and(|h| is_social_host(&h, extra_hosts))
}

/// Parse `https://x.com/{handle}/status/{id}[/...]`.
pub fn parse_post_url(raw: &str, extra_hosts: &[String]) -> Result<PostUrl> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(u.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("{raw}: only http(s) is supported")));
    }
    let host = u.host_str().unwrap_or_default().to_ascii_lowercase();
    if !is_social_host(&host, extra_hosts) {
        return Err(Error::InvalidInput(format!(
            "{raw}: not a recognized social-media URL"
        )));
    }
    let segs: Vec<&str> = u
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    match segs.as_slice() {
        [handle, "status", id, ..]
            if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(PostUrl {
                handle: normalize_handle(handle)?,
                id: id.to_string(),
            })
        }
        _ => Err(Error::InvalidInput(format!(
            "{raw}: expected a /<user>/status/<id> post URL"
        ))),
    }
}

/// Dedup by id (first occurrence wins), newest first, at most `cap` posts.
pub fn finalize_timeline(posts: Vec<Post>, cap: usize) -> Vec<Post> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Post> = posts
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect();
    out.sort_by(|a, b| b.timestamp_epoch_s.cmp(&a.timestamp_epoch_s));
    out.truncate(cap);
    out
}

/// Plain-text rendering of a post for page-shaped outputs.
pub fn post_summary(d: &PostDetail) -> String {
    let p = &d.post;
    let when = chrono::DateTime::from_timestamp(p.timestamp_epoch_s, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| d.source_date_text.clone());

    let mut s = format!("{} (@{}) posted at {}:\n\n{}\n", p.author, p.handle, when, p.text);
    if let Some(h) = &p.reply_to_handle {
        s.push_str(&format!("\nIn reply to @{h}."));
    }
    if let Some(h) = &p.retweeted_from_handle {
        s.push_str(&format!("\nRetweet of @{h}."));
    }
    if p.is_quote {
        match (&p.quoted_from_handle, &p.quoted_post_id) {
            (Some(h), Some(id)) => s.push_str(&format!("\nQuotes @{h} (post {id}).")),
            (Some(h), None) => s.push_str(&format!("\nQuotes @{h}.")),
            _ => s.push_str("\nQuotes another post."),
        }
    }
    s.push_str(&format!(
        "\nReplies: {}, retweets: {}, likes: {}\n",
        p.stats.replies, p.stats.retweets, p.stats.likes
    ));
    for m in &p.media {
        let kind = match m.kind {
            webscout_core::MediaKind::Image => "image",
            webscout_core::MediaKind::Video => "video",
        };
        s.push_str(&format!("Media ({kind}): {}\n", m.url));
    }
    if !d.conversation_posts.is_empty() {
        s.push_str(&format!("\nConversation ({} posts):\n", d.conversation_posts.len()));
        for c in &d.conversation_posts {
            s.push_str(&format!("- @{}: {}\n", c.handle, c.text));
        }
    }
    s.trim_end().to_string()
}

#[derive(Clone)]
pub struct SocialFetcher {
    mirrors: MirrorClient,
    parser: Arc<PostParser>,
    mirror_hosts: Vec<String>,
}

impl SocialFetcher {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        let mirror_hosts = config.mirror_hosts();
        Ok(Self {
            mirrors: MirrorClient::new(config)?,
            parser: Arc::new(PostParser::nitter()?),
            mirror_hosts,
        })
    }

    /// Known social hosts plus the configured mirror hosts.
    pub fn is_social_url(&self, url: &str) -> bool {
        is_social_url(url, &self.mirror_hosts)
    }

    /// Up to [`MAX_TIMELINE_POSTS`] recent posts, newest first.
    pub async fn fetch_timeline(&self, handle: &str, include_replies: bool) -> Result<Vec<Post>> {
        let handle = normalize_handle(handle)?;
        let mut plan = RequestPlan::single(format!("/{handle}"));
        if include_replies {
            plan = plan.with(format!("/{handle}/with_replies"));
        }
        let docs = self
            .mirrors
            .fetch_through_mirrors(&plan)
            .await
            .map_err(|e| unavailable(e, &format!("@{handle}")))?;

        let posts: Vec<Post> = docs
            .documents
            .iter()
            .flat_map(|doc| self.parser.parse_timeline(doc, &docs.mirror))
            .collect();
        tracing::debug!(handle = %handle, parsed = posts.len(), mirror = %docs.mirror, "timeline parsed");
        Ok(finalize_timeline(posts, MAX_TIMELINE_POSTS))
    }

    /// One post plus its surrounding conversation.
    pub async fn fetch_by_url(&self, url: &str) -> Result<PostDetail> {
        let target = parse_post_url(url, &self.mirror_hosts)?;
        let plan = RequestPlan::single(target.path());
        let docs = self
            .mirrors
            .fetch_through_mirrors(&plan)
            .await
            .map_err(|e| unavailable(e, url))?;
        let doc = docs
            .documents
            .first()
            .ok_or_else(|| Error::ParseFailed("mirror returned no document".to_string()))?;
        self.parser.parse_detail(doc, &docs.mirror, Some(&target.id))
    }
}

fn unavailable(e: Error, what: &str) -> Error {
    match e {
        Error::MirrorUnavailable { attempts } => Error::NotFoundOrUnavailable(format!(
            "{what}: no mirror served the page ({attempts} attempts)"
        )),
        other => other,
    }
}
