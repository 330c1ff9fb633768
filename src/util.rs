//! Small helpers shared by the handlers: client identification, a cached
//! phrase matcher, and character-safe truncation.

use ahash::AHasher;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use axum::http::HeaderMap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

/// A memoising wrapper around `AhoCorasick::new` to avoid recompiling
/// automata for repeated lists.  The cache key is a hash of the phrase list.
static AC_CACHE: Lazy<DashMap<u64, Arc<AhoCorasick>>> = Lazy::new(DashMap::new);

/// Given a list of literal phrases, return a shared case-insensitive
/// matcher. Returns `None` when the list is empty or cannot be compiled.
pub fn ac_for(list: &[String]) -> Option<Arc<AhoCorasick>> {
    if list.is_empty() {
        return None;
    }
    let mut hasher = AHasher::default();
    for pat in list {
        pat.hash(&mut hasher);
    }
    let key = hasher.finish();
    if let Some(existing) = AC_CACHE.get(&key) {
        return Some(existing.clone());
    }
    let lower: Vec<String> = list.iter().map(|p| p.to_lowercase()).collect();
    match AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(lower)
    {
        Ok(ac) => {
            let arc = Arc::new(ac);
            AC_CACHE.insert(key, arc.clone());
            Some(arc)
        }
        Err(err) => {
            tracing::warn!(error = %err, phrases = list.len(), "failed to build phrase matcher");
            None
        }
    }
}

/// Best-effort client address. Proxy headers win over the socket peer
/// because the service normally sits behind a CDN.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(first) = header("x-forwarded-for")
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(ip) = header("x-real-ip") {
        return ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Lower-case the first character of `text`.
pub fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
