//! Deterministic identity normalization for brands and URLs.
//!
//! Everything here is pure and total: identical input always yields identical
//! output, because these outputs feed content fingerprints. Unparsable input
//! comes back as `None` (or `""` for brand names) so ingestion can flag
//! "no usable identity" without aborting a batch.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap());

/// Trailing corporate suffixes dropped from brand names (when more than one
/// token remains).
const CORPORATE_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "co", "corp", "corporation", "company", "gmbh", "plc", "sa", "bv", "ag",
    "nv", "srl", "pty", "oy", "ab",
];

/// Path segments that mark a facebook.com URL as something other than a page.
const NON_PAGE_SEGMENTS: &[&str] = &[
    "ads-library",
    "ads",
    "groups",
    "events",
    "watch",
    "reels",
    "photos",
    "videos",
    "posts",
    "stories",
];

/// Canonical lookup key for a brand name: lowercase, punctuation and
/// underscores become spaces, whitespace collapsed, trailing corporate
/// suffixes dropped while more than one token remains. Idempotent.
pub fn normalize_brand_name(name: &str) -> String {
    let lowered: String = name
        .chars()
        .flat_map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                vec![' ']
            }
        })
        .collect();

    let mut tokens: Vec<&str> = lowered.split_whitespace().collect();
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if CORPORATE_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }
    tokens.join(" ")
}

/// Canonical form of a URL: `https://` assumed when no scheme, host
/// lowercased with leading `www.` stripped, repeated slashes collapsed,
/// trailing slash stripped except at root, fragment dropped, query kept.
/// `None` when the input does not parse to a URL with a host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if SCHEME_RE.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }

    let mut out = format!("{}://{host}", parsed.scheme());
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{port}"));
    }

    let path = collapse_slashes(parsed.path());
    if path == "/" {
        out.push('/');
    } else {
        out.push_str(path.trim_end_matches('/'));
    }

    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }

    Some(out)
}

/// Hostname portion of the normalized URL, `www.` stripped.
pub fn derive_primary_domain(raw: &str) -> Option<String> {
    let normalized = normalize_url(raw)?;
    let parsed = Url::parse(&normalized).ok()?;
    parsed.host_str().map(str::to_string)
}

/// Canonical Facebook page URL: host must be facebook.com (any subdomain),
/// forced to `https://www.facebook.com`, path case preserved, query and
/// fragment dropped. Root paths and paths containing a non-page segment
/// (ads library, groups, videos, ...) come back as `None`.
pub fn normalize_facebook_page_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if SCHEME_RE.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if host != "facebook.com" && !host.ends_with(".facebook.com") {
        return None;
    }

    let path = collapse_slashes(parsed.path());
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if NON_PAGE_SEGMENTS.contains(&segment.to_lowercase().as_str()) {
            return None;
        }
    }

    Some(format!("https://www.facebook.com{path}"))
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}
