//! Injected configuration for the mirror cascade, page extractor, and search provider.
//!
//! Every struct has a `Default` matching production values and a `from_env()` that applies
//! `WEBSCOUT_*` overrides. Tests construct the structs directly.

use std::time::Duration;

/// Public mirrors tried in order for social-media pages.
pub const DEFAULT_MIRRORS: [&str; 5] = [
    "https://nitter.net",
    "https://xcancel.com",
    "https://nitter.privacydev.net",
    "https://nitter.poast.org",
    "https://nitter.space",
];

/// Rewriting proxies: the target URL is percent-encoded and appended to the prefix.
pub const DEFAULT_PROXIES: [&str; 2] = [
    "https://api.allorigins.win/raw?url=",
    "https://corsproxy.io/?url=",
];

pub const DEFAULT_MIRROR_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FETCH_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 10_000;
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 100;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env(key).and_then(|s| s.parse::<u64>().ok())
}

/// Comma/whitespace-separated list, deduplicated, order preserved.
pub fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env(key)?;
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let s = part.trim();
        if s.is_empty() {
            continue;
        }
        let s = s.to_string();
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Some(out)
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Mirror base URLs, highest priority first.
    pub mirrors: Vec<String>,
    /// Proxy prefixes tried (in order) before a direct request to each mirror.
    pub proxies: Vec<String>,
    pub timeout: Duration,
    pub user_agents: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS.iter().map(|s| s.to_string()).collect(),
            proxies: DEFAULT_PROXIES.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_millis(DEFAULT_MIRROR_TIMEOUT_MS),
            user_agents: crate::default_user_agents(),
        }
    }
}

impl MirrorConfig {
    /// Defaults overridden by `WEBSCOUT_MIRRORS`, `WEBSCOUT_PROXIES` (`none` disables proxies),
    /// and `WEBSCOUT_MIRROR_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(m) = env_list("WEBSCOUT_MIRRORS").filter(|m| !m.is_empty()) {
            cfg.mirrors = m;
        }
        if let Some(p) = env("WEBSCOUT_PROXIES") {
            if p.eq_ignore_ascii_case("none") {
                cfg.proxies = Vec::new();
            } else if let Some(list) = env_list("WEBSCOUT_PROXIES") {
                cfg.proxies = list;
            }
        }
        if let Some(ms) = env_u64("WEBSCOUT_MIRROR_TIMEOUT_MS") {
            cfg.timeout = Duration::from_millis(ms.clamp(500, 120_000));
        }
        cfg
    }

    /// Direct-only cascade over the given mirrors.
    pub fn direct(mirrors: Vec<String>) -> Self {
        Self {
            mirrors,
            proxies: Vec::new(),
            ..Self::default()
        }
    }

    /// Lowercased hostnames of the configured mirrors.
    pub fn mirror_hosts(&self) -> Vec<String> {
        self.mirrors
            .iter()
            .filter_map(|m| url::Url::parse(m).ok())
            .filter_map(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub timeout: Duration,
    pub max_bytes: u64,
    /// Content longer than this is cut and marked.
    pub max_chars: usize,
    /// A main-content candidate must exceed this many characters to be accepted.
    pub min_content_chars: usize,
    pub user_agents: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            max_bytes: DEFAULT_FETCH_MAX_BYTES,
            max_chars: DEFAULT_MAX_CONTENT_CHARS,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            user_agents: crate::default_user_agents(),
        }
    }
}

impl ExtractConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_u64("WEBSCOUT_FETCH_TIMEOUT_MS") {
            cfg.timeout = Duration::from_millis(ms.clamp(500, 120_000));
        }
        if let Some(n) = env_u64("WEBSCOUT_FETCH_MAX_BYTES") {
            cfg.max_bytes = n.clamp(1_024, 100 * 1024 * 1024);
        }
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// SearXNG-compatible base URL (or full `/search` endpoint).
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
    pub user_agents: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: None,
            user_agents: crate::default_user_agents(),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env("WEBSCOUT_SEARCH_ENDPOINT"),
            timeout: env_u64("WEBSCOUT_SEARCH_TIMEOUT_MS").map(Duration::from_millis),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    #[test]
    fn env_list_splits_and_dedups() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g = EnvGuard::set("WEBSCOUT_MIRRORS", "http://a, http://b http://a");
        assert_eq!(
            env_list("WEBSCOUT_MIRRORS"),
            Some(vec!["http://a".to_string(), "http://b".to_string()])
        );
    }

    #[test]
    fn mirror_config_from_env_overrides_and_disables_proxies() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::set("WEBSCOUT_MIRRORS", "http://m1,http://m2");
        let _g2 = EnvGuard::set("WEBSCOUT_PROXIES", "none");
        let _g3 = EnvGuard::set("WEBSCOUT_MIRROR_TIMEOUT_MS", "2500");
        let cfg = MirrorConfig::from_env();
        assert_eq!(cfg.mirrors, vec!["http://m1", "http://m2"]);
        assert!(cfg.proxies.is_empty());
        assert_eq!(cfg.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn empty_env_values_keep_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::set("WEBSCOUT_MIRRORS", "   ");
        let _g2 = EnvGuard::set("WEBSCOUT_PROXIES", "");
        let cfg = MirrorConfig::from_env();
        assert_eq!(cfg.mirrors.len(), DEFAULT_MIRRORS.len());
        assert_eq!(cfg.proxies.len(), DEFAULT_PROXIES.len());
    }

    #[test]
    fn mirror_hosts_are_lowercased() {
        let cfg = MirrorConfig::direct(vec!["https://Nitter.Example/".to_string()]);
        assert_eq!(cfg.mirror_hosts(), vec!["nitter.example".to_string()]);
    }
}
