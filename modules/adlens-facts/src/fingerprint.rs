//! Versioned content fingerprints for creative deduplication.
//!
//! The primary fingerprint covers channel + normalized copy + the ordered
//! asset descriptor list. The secondary media/copy fingerprints are advisory
//! only and never participate in identity resolution. Any change to these
//! procedures requires a new algo label; existing creatives are never
//! re-fingerprinted in place.

use sha2::{Digest, Sha256};

use adlens_common::{Ad, MediaAsset};

/// Label for the current fingerprint procedure. Partitions the creative key
/// space; bump on any change to the canonical byte string.
pub const FINGERPRINT_ALGO: &str = "sha256-v1";

/// Payload keys whose string values count as ad copy.
const COPY_KEYS: &[&str] = &[
    "primary_text",
    "body",
    "text",
    "message",
    "headline",
    "description",
    "link_description",
    "cta_text",
];

/// Metadata keys that give an asset a stable content key, in priority order.
const CONTENT_KEY_FIELDS: &[&str] = &["checksum", "content_hash", "fingerprint", "native_id"];

/// Primary dedup fingerprint: SHA-256 over channel, normalized copy, and the
/// ordered asset descriptors. Hex-encoded.
pub fn creative_fingerprint(ad: &Ad, assets: &[MediaAsset]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ad.channel.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized_copy(ad).as_bytes());
    for asset in assets {
        hasher.update(b"\n");
        hasher.update(asset.media_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(asset_content_key(asset).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Copy-insensitive advisory fingerprint over the sorted asset content keys.
/// `None` without assets.
pub fn media_fingerprint(assets: &[MediaAsset]) -> Option<String> {
    if assets.is_empty() {
        return None;
    }
    let mut descriptors: Vec<String> = assets
        .iter()
        .map(|a| format!("{}:{}", a.media_type.as_str(), asset_content_key(a)))
        .collect();
    descriptors.sort();

    let mut hasher = Sha256::new();
    for descriptor in descriptors {
        hasher.update(descriptor.as_bytes());
        hasher.update(b"\n");
    }
    Some(hex::encode(hasher.finalize()))
}

/// Media-insensitive advisory fingerprint over the normalized ad copy.
/// `None` when the payload carries no copy.
pub fn copy_fingerprint(ad: &Ad) -> Option<String> {
    let copy = normalized_copy(ad);
    if copy.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(copy.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Ad copy drawn from known payload fields, whitespace-collapsed and
/// lowercased. Field traversal is key-sorted (serde_json map order), so the
/// result does not depend on payload field order.
fn normalized_copy(ad: &Ad) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_copy(&ad.raw_payload, &mut parts);
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn collect_copy(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if COPY_KEYS.contains(&key.to_lowercase().as_str()) {
                    match v {
                        serde_json::Value::String(s) => out.push(s.clone()),
                        serde_json::Value::Array(items) => {
                            for item in items {
                                if let Some(s) = item.as_str() {
                                    out.push(s.to_string());
                                }
                            }
                        }
                        _ => {}
                    }
                } else {
                    collect_copy(v, out);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_copy(item, out);
            }
        }
        _ => {}
    }
}

/// Stable per-asset content key: a checksum/native id from metadata, else
/// the source URL, else the position within the ad.
fn asset_content_key(asset: &MediaAsset) -> String {
    for field in CONTENT_KEY_FIELDS {
        if let Some(s) = asset.metadata.get(*field).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
    }
    if let Some(url) = asset.source_url.as_deref() {
        if !url.is_empty() {
            return url.to_string();
        }
    }
    asset.position.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_common::{AdStatus, Channel, MediaType};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn ad(channel: Channel, payload: serde_json::Value) -> Ad {
        Ad {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            channel,
            status: AdStatus::Active,
            external_id: None,
            raw_payload: payload,
            started_running_at: None,
            ended_running_at: None,
            first_seen_at: None,
            last_seen_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn asset(media_type: MediaType, position: i32, metadata: serde_json::Value) -> MediaAsset {
        MediaAsset {
            id: Uuid::new_v4(),
            ad_id: Uuid::new_v4(),
            media_type,
            position,
            duration_ms: None,
            source_url: None,
            metadata,
        }
    }

    #[test]
    fn identical_content_yields_identical_digest() {
        let a = ad(Channel::Meta, json!({"body": "Shop  The Sale", "id": "123"}));
        let b = ad(Channel::Meta, json!({"id": "999", "body": "shop the sale"}));
        let assets_a = vec![asset(MediaType::Image, 0, json!({"checksum": "abc"}))];
        let assets_b = vec![asset(MediaType::Image, 3, json!({"checksum": "abc"}))];
        assert_eq!(
            creative_fingerprint(&a, &assets_a),
            creative_fingerprint(&b, &assets_b)
        );
    }

    #[test]
    fn copy_and_channel_changes_change_the_digest() {
        let base = ad(Channel::Meta, json!({"body": "shop the sale"}));
        let other_copy = ad(Channel::Meta, json!({"body": "shop the other sale"}));
        let other_channel = ad(Channel::Tiktok, json!({"body": "shop the sale"}));
        assert_ne!(creative_fingerprint(&base, &[]), creative_fingerprint(&other_copy, &[]));
        assert_ne!(creative_fingerprint(&base, &[]), creative_fingerprint(&other_channel, &[]));
    }

    #[test]
    fn media_fingerprint_ignores_asset_order() {
        let forward = vec![
            asset(MediaType::Image, 0, json!({"checksum": "aaa"})),
            asset(MediaType::Image, 1, json!({"checksum": "bbb"})),
        ];
        let reversed = vec![
            asset(MediaType::Image, 0, json!({"checksum": "bbb"})),
            asset(MediaType::Image, 1, json!({"checksum": "aaa"})),
        ];
        assert_eq!(media_fingerprint(&forward), media_fingerprint(&reversed));
        assert_eq!(media_fingerprint(&[]), None);
    }

    #[test]
    fn content_key_falls_back_url_then_position() {
        let mut by_url = asset(MediaType::Video, 0, json!({}));
        by_url.source_url = Some("https://cdn.example.com/v.mp4".to_string());
        let by_position = asset(MediaType::Video, 0, json!({}));
        assert_ne!(
            media_fingerprint(std::slice::from_ref(&by_url)),
            media_fingerprint(std::slice::from_ref(&by_position))
        );
    }

    #[test]
    fn copy_fingerprint_none_without_copy() {
        let no_copy = ad(Channel::Meta, json!({"id": "123"}));
        assert_eq!(copy_fingerprint(&no_copy), None);
        let with_copy = ad(Channel::Meta, json!({"headline": "Big"}));
        assert!(copy_fingerprint(&with_copy).is_some());
    }
}
