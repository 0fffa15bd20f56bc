//! AdFactsDeriver — pure re-derivation of per-ad analytics.
//!
//! One call produces the whole row from the ad and its ordered media assets.
//! The row fully replaces any prior one; there is no incremental patching.
//! `now` is injected so `days_active` for still-running ads is deterministic
//! in tests.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use uuid::Uuid;

use adlens_common::{Ad, AdStatus, MediaAsset, MediaType};

static LOCALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}([_-][A-Za-z0-9]{2,8})*$").unwrap());

/// Payload keys whose values carry language or locale tokens.
const LANGUAGE_KEYS: &[&str] = &[
    "languages",
    "language",
    "locale",
    "locales",
    "lang",
    "content_languages",
];

/// Payload keys whose values carry country tokens.
const COUNTRY_KEYS: &[&str] = &[
    "countries",
    "country",
    "country_code",
    "country_codes",
    "target_countries",
    "reached_countries",
    "delivery_countries",
];

/// Derived analytics row, one per ad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdFacts {
    pub ad_id: Uuid,
    pub display_format: Option<String>,
    pub video_length_seconds: Option<i64>,
    pub media_types: Vec<String>,
    pub language_codes: Vec<String>,
    pub country_codes: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub days_active: Option<i64>,
    pub derived_at: DateTime<Utc>,
}

/// Compute the full [`AdFacts`] row for one ad and its ordered assets.
pub fn derive_ad_facts(ad: &Ad, assets: &[MediaAsset], now: DateTime<Utc>) -> AdFacts {
    let start_date = ad
        .started_running_at
        .or(ad.first_seen_at)
        .map(|ts| ts.date_naive());

    let end = ad
        .ended_running_at
        .or(ad.last_seen_at)
        .or_else(|| (ad.status == AdStatus::Active).then_some(now));

    let days_active = match (start_date, end) {
        (Some(start), Some(end)) => {
            // Inclusive day count, floored at 1.
            Some(((end.date_naive() - start).num_days() + 1).max(1))
        }
        _ => None,
    };

    AdFacts {
        ad_id: ad.id,
        display_format: display_format(assets),
        video_length_seconds: video_length_seconds(assets),
        media_types: media_types(assets),
        language_codes: scan_codes(&ad.raw_payload, LANGUAGE_KEYS),
        country_codes: scan_codes(&ad.raw_payload, COUNTRY_KEYS),
        start_date,
        days_active,
        derived_at: now,
    }
}

fn display_format(assets: &[MediaAsset]) -> Option<String> {
    let first = assets.first()?;
    if assets.iter().any(|a| a.media_type == MediaType::Video) {
        return Some("video".to_string());
    }
    let stills = assets
        .iter()
        .filter(|a| matches!(a.media_type, MediaType::Image | MediaType::Screenshot))
        .count();
    let format = match stills {
        n if n > 1 => "carousel",
        1 => "image",
        _ => first.media_type.as_str(),
    };
    Some(format.to_string())
}

/// Max usable video duration across video assets, in whole seconds, floored
/// at 1. Candidates come from the explicit `duration_ms` column and from
/// metadata fields whose names suggest seconds (contains "second", or exactly
/// "duration") or milliseconds (ends with "_ms").
fn video_length_seconds(assets: &[MediaAsset]) -> Option<i64> {
    let mut candidates_ms: Vec<i64> = Vec::new();
    for asset in assets.iter().filter(|a| a.media_type == MediaType::Video) {
        if let Some(ms) = asset.duration_ms {
            if ms > 0 {
                candidates_ms.push(ms);
            }
        }
        collect_duration_candidates(&asset.metadata, &mut candidates_ms);
    }
    candidates_ms
        .into_iter()
        .max()
        .map(|ms| (ms / 1000).max(1))
}

fn collect_duration_candidates(value: &Value, out: &mut Vec<i64>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if let Some(n) = v.as_f64() {
                    let key = key.to_lowercase();
                    let ms = if key.ends_with("_ms") {
                        n
                    } else if key.contains("second") || key == "duration" {
                        n * 1000.0
                    } else {
                        continue;
                    };
                    if ms > 0.0 {
                        out.push(ms as i64);
                    }
                } else {
                    collect_duration_candidates(v, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_duration_candidates(item, out);
            }
        }
        _ => {}
    }
}

fn media_types(assets: &[MediaAsset]) -> Vec<String> {
    let distinct: BTreeSet<&'static str> = assets.iter().map(|a| a.media_type.code()).collect();
    distinct.into_iter().map(str::to_string).collect()
}

/// Walk the payload for the given key names and reduce every locale-like
/// string value (`en_US`, `es-ES`, `de`) to its uppercased primary subtag.
/// Deduplicated and sorted.
fn scan_codes(payload: &Value, keys: &[&str]) -> Vec<String> {
    let mut found = BTreeSet::new();
    walk_for_keys(payload, keys, &mut found);
    found.into_iter().collect()
}

fn walk_for_keys(value: &Value, keys: &[&str], out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if keys.contains(&key.to_lowercase().as_str()) {
                    collect_code_tokens(v, out);
                }
                // Values also nest under targeting/delivery/distribution blocks.
                walk_for_keys(v, keys, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_for_keys(item, keys, out);
            }
        }
        _ => {}
    }
}

fn collect_code_tokens(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => push_code_token(s, out),
        Value::Array(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    push_code_token(s, out);
                }
            }
        }
        _ => {}
    }
}

fn push_code_token(raw: &str, out: &mut BTreeSet<String>) {
    let token = raw.trim();
    if LOCALE_RE.is_match(token) {
        let primary = token.split(['_', '-']).next().unwrap_or(token);
        out.insert(primary.to_uppercase());
    }
}
