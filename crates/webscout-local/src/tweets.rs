//! Parse mirror-rendered timeline and single-post pages into [`Post`] records.
//!
//! Selectors live in [`PostRules`] (data, not code) so alternative mirror layouts can be
//! described without touching the traversal.
//!
//! Timeline items missing a content block, permalink id, or parseable timestamp are dropped.
//! A single-post page without its main container is a `ParseFailed` error.

use chrono::NaiveDateTime;
use html_scraper::{ElementRef, Html, Selector};
use tracing::debug;
use webscout_core::{
    ConversationPost, Error, Media, MediaKind, Post, PostDetail, PostStats, Result,
};

/// One media source: elements matching `selector`, URL read from `attr`.
#[derive(Debug, Clone, Copy)]
pub struct MediaRule {
    pub selector: &'static str,
    pub attr: &'static str,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy)]
pub struct PostRules {
    pub item: &'static str,
    pub pinned: &'static str,
    pub content: &'static str,
    pub permalink: &'static str,
    pub date: &'static str,
    /// Attribute holding the full-precision timestamp (the link text is abbreviated).
    pub date_attr: &'static str,
    pub fullname: &'static str,
    pub username: &'static str,
    pub reply_marker: &'static str,
    pub reply_handle: &'static str,
    pub retweet_marker: &'static str,
    pub quote: &'static str,
    pub quote_link: &'static str,
    pub quote_username: &'static str,
    pub stat: &'static str,
    pub reply_icon: &'static str,
    pub retweet_icon: &'static str,
    pub like_icon: &'static str,
    pub media: &'static [MediaRule],
    pub main_post: &'static str,
    pub published: &'static str,
}

pub const NITTER_MEDIA: [MediaRule; 3] = [
    MediaRule {
        selector: ".attachments img",
        attr: "src",
        kind: MediaKind::Image,
    },
    MediaRule {
        selector: ".attachments video",
        attr: "data-url",
        kind: MediaKind::Video,
    },
    MediaRule {
        selector: ".attachments video source",
        attr: "src",
        kind: MediaKind::Video,
    },
];

/// Layout served by nitter-style mirrors.
pub const NITTER: PostRules = PostRules {
    item: ".timeline-item",
    pinned: ".pinned",
    content: ".tweet-content",
    permalink: "a.tweet-link",
    date: ".tweet-date a",
    date_attr: "title",
    fullname: ".tweet-header .fullname",
    username: ".tweet-header .username",
    reply_marker: ".replying-to",
    reply_handle: "a",
    retweet_marker: ".retweet-header",
    quote: ".quote",
    quote_link: "a.quote-link",
    quote_username: ".username",
    stat: ".tweet-stat",
    reply_icon: "icon-comment",
    retweet_icon: "icon-retweet",
    like_icon: "icon-heart",
    media: &NITTER_MEDIA,
    main_post: ".main-tweet",
    published: ".tweet-published",
};

/// Decode abbreviated engagement counts: `"1.2k"` → 1200, `"3M"` → 3000000, `"1,234"` → 1234.
/// Anything unparseable is 0.
pub fn parse_compact_count(s: &str) -> u64 {
    let t = s.trim().replace(',', "").to_ascii_lowercase();
    if t.is_empty() {
        return 0;
    }
    let (num, mult) = if let Some(n) = t.strip_suffix('k') {
        (n, 1_000f64)
    } else if let Some(n) = t.strip_suffix('m') {
        (n, 1_000_000f64)
    } else {
        return t.parse::<u64>().unwrap_or(0);
    };
    match num.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * mult).round() as u64,
        _ => 0,
    }
}

/// Parse a tooltip timestamp like `"Jan 5, 2024 · 3:04 PM UTC"` into epoch seconds.
pub fn parse_post_timestamp(s: &str) -> Option<i64> {
    let cleaned = s.replace('·', " ").replace("UTC", " ");
    let norm = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if norm.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&norm, "%b %d, %Y %I:%M %p")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Post id from a permalink such as `/jack/status/20#m`.
pub fn status_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/status/")?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

fn handle_from_href(href: &str) -> Option<String> {
    let path = href.split_once("/status/")?.0;
    let h = path.rsplit('/').next()?.trim();
    (!h.is_empty()).then(|| h.to_string())
}

/// Root-relative URLs are resolved against the mirror that served the page.
pub fn absolutize(src: &str, mirror: &str) -> String {
    if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        format!("{}{}", mirror.trim_end_matches('/'), src)
    } else {
        src.to_string()
    }
}

fn strip_at(s: &str) -> String {
    s.trim().trim_start_matches('@').to_string()
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn sel(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| Error::ParseFailed(format!("bad selector {s:?}: {e}")))
}

struct CompiledMedia {
    sel: Selector,
    attr: &'static str,
    kind: MediaKind,
}

/// [`PostRules`] with every selector compiled once.
pub struct PostParser {
    rules: PostRules,
    item: Selector,
    pinned: Selector,
    content: Selector,
    permalink: Selector,
    date: Selector,
    fullname: Selector,
    username: Selector,
    reply_marker: Selector,
    reply_handle: Selector,
    retweet_marker: Selector,
    quote: Selector,
    quote_link: Selector,
    quote_username: Selector,
    stat: Selector,
    media: Vec<CompiledMedia>,
    main_post: Selector,
    published: Selector,
    any: Selector,
}

impl PostParser {
    pub fn new(rules: PostRules) -> Result<Self> {
        let media = rules
            .media
            .iter()
            .map(|m| {
                Ok(CompiledMedia {
                    sel: sel(m.selector)?,
                    attr: m.attr,
                    kind: m.kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            item: sel(rules.item)?,
            pinned: sel(rules.pinned)?,
            content: sel(rules.content)?,
            permalink: sel(rules.permalink)?,
            date: sel(rules.date)?,
            fullname: sel(rules.fullname)?,
            username: sel(rules.username)?,
            reply_marker: sel(rules.reply_marker)?,
            reply_handle: sel(rules.reply_handle)?,
            retweet_marker: sel(rules.retweet_marker)?,
            quote: sel(rules.quote)?,
            quote_link: sel(rules.quote_link)?,
            quote_username: sel(rules.quote_username)?,
            stat: sel(rules.stat)?,
            media,
            main_post: sel(rules.main_post)?,
            published: sel(rules.published)?,
            any: sel("*")?,
            rules,
        })
    }

    pub fn nitter() -> Result<Self> {
        Self::new(NITTER)
    }

    /// All well-formed, non-pinned items in document order.
    pub fn parse_timeline(&self, html: &str, mirror: &str) -> Vec<Post> {
        let doc = Html::parse_document(html);
        let mut seen = 0usize;
        let posts: Vec<Post> = doc
            .select(&self.item)
            .filter(|el| el.select(&self.pinned).next().is_none())
            .inspect(|_| seen += 1)
            .filter_map(|el| self.parse_item(el, mirror, None))
            .collect();
        if posts.len() < seen {
            debug!(skipped = seen - posts.len(), kept = posts.len(), "dropped malformed timeline items");
        }
        posts
    }

    /// The page's main post plus the other items around it.
    ///
    /// `fallback_id` is used when the main post carries no permalink of its own.
    pub fn parse_detail(
        &self,
        html: &str,
        mirror: &str,
        fallback_id: Option<&str>,
    ) -> Result<PostDetail> {
        let doc = Html::parse_document(html);
        let main = doc
            .select(&self.main_post)
            .next()
            .ok_or_else(|| Error::ParseFailed("main post container not found".to_string()))?;
        // The container usually wraps a regular timeline item; fall back to the container.
        let primary = main.select(&self.item).next().unwrap_or(main);

        let post = self.parse_item(primary, mirror, fallback_id).ok_or_else(|| {
            Error::ParseFailed("main post is missing content, id, or timestamp".to_string())
        })?;

        let source_date_text = main
            .select(&self.published)
            .next()
            .map(text_of)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                primary
                    .select(&self.date)
                    .next()
                    .and_then(|d| d.value().attr(self.rules.date_attr))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_default();

        let main_id = main.id();
        let conversation_posts = doc
            .select(&self.item)
            .filter(|el| el.id() != main_id && !el.ancestors().any(|a| a.id() == main_id))
            .filter_map(|el| self.parse_conversation_item(el))
            .filter(|c| c.id != post.id)
            .collect();

        Ok(PostDetail {
            post,
            source_date_text,
            conversation_posts,
        })
    }

    fn permalink_href<'a>(&self, el: ElementRef<'a>) -> Option<&'a str> {
        el.select(&self.permalink)
            .next()
            .and_then(|a| a.value().attr("href"))
    }

    fn parse_conversation_item(&self, el: ElementRef<'_>) -> Option<ConversationPost> {
        let href = self.permalink_href(el)?;
        let id = status_id_from_href(href)?;
        let handle = el
            .select(&self.username)
            .next()
            .map(|u| strip_at(&text_of(u)))
            .filter(|h| !h.is_empty())
            .or_else(|| handle_from_href(href))
            .unwrap_or_default();
        let text = el.select(&self.content).next().map(text_of)?;
        Some(ConversationPost { id, handle, text })
    }

    fn parse_item(&self, el: ElementRef<'_>, mirror: &str, fallback_id: Option<&str>) -> Option<Post> {
        let content = el.select(&self.content).next()?;
        let href = self.permalink_href(el);
        let id = href
            .and_then(status_id_from_href)
            .or_else(|| fallback_id.map(|s| s.to_string()))?;
        let timestamp_epoch_s = el
            .select(&self.date)
            .next()
            .and_then(|d| d.value().attr(self.rules.date_attr))
            .and_then(parse_post_timestamp)?;

        let handle = el
            .select(&self.username)
            .next()
            .map(|u| strip_at(&text_of(u)))
            .filter(|h| !h.is_empty())
            .or_else(|| href.and_then(handle_from_href))
            .unwrap_or_default();
        let author = el
            .select(&self.fullname)
            .next()
            .map(text_of)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| handle.clone());

        let reply = el.select(&self.reply_marker).next();
        let reply_to_handle = reply.and_then(|r| {
            r.select(&self.reply_handle)
                .next()
                .map(|a| strip_at(&text_of(a)))
                .or_else(|| {
                    text_of(r)
                        .split_whitespace()
                        .find(|w| w.starts_with('@'))
                        .map(strip_at)
                })
                .filter(|h| !h.is_empty())
        });

        let is_retweet = el.select(&self.retweet_marker).next().is_some();
        let retweeted_from_handle = (is_retweet && !handle.is_empty()).then(|| handle.clone());

        let quote = el.select(&self.quote).next();
        let quoted_post_id = quote.and_then(|q| {
            q.select(&self.quote_link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(status_id_from_href)
        });
        let quoted_from_handle = quote.and_then(|q| {
            q.select(&self.quote_username)
                .next()
                .map(|u| strip_at(&text_of(u)))
                .filter(|h| !h.is_empty())
        });

        Some(Post {
            id,
            text: text_of(content),
            author,
            handle,
            timestamp_epoch_s,
            stats: self.parse_stats(el),
            media: self.parse_media(el, mirror),
            is_reply: reply.is_some(),
            is_retweet,
            is_quote: quote.is_some(),
            reply_to_handle,
            retweeted_from_handle,
            quoted_from_handle,
            quoted_post_id,
        })
    }

    fn parse_stats(&self, el: ElementRef<'_>) -> PostStats {
        let mut stats = PostStats::default();
        for stat in el.select(&self.stat) {
            let has_icon = |icon: &str| {
                stat.select(&self.any)
                    .any(|d| d.value().classes().any(|c| c == icon))
            };
            let n = parse_compact_count(&text_of(stat));
            if has_icon(self.rules.reply_icon) {
                stats.replies = n;
            } else if has_icon(self.rules.retweet_icon) {
                stats.retweets = n;
            } else if has_icon(self.rules.like_icon) {
                stats.likes = n;
            }
        }
        stats
    }

    fn parse_media(&self, el: ElementRef<'_>, mirror: &str) -> Vec<Media> {
        let mut out: Vec<Media> = Vec::new();
        for rule in &self.media {
            for m in el.select(&rule.sel) {
                let Some(src) = m.value().attr(rule.attr).map(str::trim) else {
                    continue;
                };
                if src.is_empty() {
                    continue;
                }
                let url = absolutize(src, mirror);
                if out.iter().any(|x| x.url == url) {
                    continue;
                }
                out.push(Media {
                    kind: rule.kind,
                    url,
                });
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// One nitter-style timeline item.
    pub struct Item<'a> {
        pub id: &'a str,
        pub handle: &'a str,
        pub name: &'a str,
        pub text: &'a str,
        pub date_title: &'a str,
        pub extra: &'a str,
    }

    impl Item<'_> {
        pub fn html(&self) -> String {
            format!(
                r#"<div class="timeline-item">
  <a class="tweet-link" href="/{h}/status/{id}#m"></a>
  <div class="tweet-body">
    {extra}
    <div class="tweet-header">
      <a class="fullname" href="/{h}">{name}</a>
      <a class="username" href="/{h}">@{h}</a>
      <span class="tweet-date"><a href="/{h}/status/{id}#m" title="{date}">2h</a></span>
    </div>
    <div class="tweet-content media-body">{text}</div>
    <div class="tweet-stats">
      <span class="tweet-stat"><div class="icon-container"><span class="icon-comment"></span> 12</div></span>
      <span class="tweet-stat"><div class="icon-container"><span class="icon-retweet"></span> 1.2K</div></span>
      <span class="tweet-stat"><div class="icon-container"><span class="icon-heart"></span> 3M</div></span>
    </div>
  </div>
</div>"#,
                h = self.handle,
                id = self.id,
                name = self.name,
                text = self.text,
                date = self.date_title,
                extra = self.extra,
            )
        }
    }

    pub fn item(id: &str, date_title: &str) -> String {
        Item {
            id,
            handle: "jack",
            name: "jack",
            text: &format!("post {id}"),
            date_title,
            extra: "",
        }
        .html()
    }

    pub fn timeline(items: &[String]) -> String {
        format!(
            "<html><body><div class=\"timeline\">{}</div></body></html>",
            items.join("\n")
        )
    }
}
