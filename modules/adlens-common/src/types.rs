use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

/// Advertising channel an ad was ingested from. Stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum Channel {
    Meta,
    Tiktok,
    Youtube,
    Google,
    Linkedin,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Meta => "meta",
            Channel::Tiktok => "tiktok",
            Channel::Youtube => "youtube",
            Channel::Google => "google",
            Channel::Linkedin => "linkedin",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "meta" | "facebook" | "instagram" => Some(Channel::Meta),
            "tiktok" => Some(Channel::Tiktok),
            "youtube" => Some(Channel::Youtube),
            "google" => Some(Channel::Google),
            "linkedin" => Some(Channel::Linkedin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, sqlx::Type, Default)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum AdStatus {
    Active,
    Inactive,
    Removed,
    #[default]
    Unknown,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Active => "active",
            AdStatus::Inactive => "inactive",
            AdStatus::Removed => "removed",
            AdStatus::Unknown => "unknown",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" | "running" => AdStatus::Active,
            "inactive" | "paused" | "ended" => AdStatus::Inactive,
            "removed" | "deleted" => AdStatus::Removed,
            _ => AdStatus::Unknown,
        }
    }
}

impl std::fmt::Display for AdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Image,
    Screenshot,
    Text,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Screenshot => "screenshot",
            MediaType::Text => "text",
            MediaType::Audio => "audio",
        }
    }

    /// Uppercase code used in derived `media_types` arrays.
    pub fn code(&self) -> &'static str {
        match self {
            MediaType::Video => "VIDEO",
            MediaType::Image => "IMAGE",
            MediaType::Screenshot => "SCREENSHOT",
            MediaType::Text => "TEXT",
            MediaType::Audio => "AUDIO",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Rows ---

/// One ingested advertisement instance. Identity is immutable; status and
/// running/seen dates are refreshed on re-crawl.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ad {
    pub id: Uuid,
    pub org_id: Uuid,
    pub brand_id: Uuid,
    pub channel: Channel,
    pub status: AdStatus,
    /// Per-channel native id (ad library id, etc). Advisory, not identity.
    pub external_id: Option<String>,
    pub raw_payload: serde_json::Value,
    pub started_running_at: Option<DateTime<Utc>>,
    pub ended_running_at: Option<DateTime<Utc>>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One media asset referenced by an ad, ordered by `position`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaAsset {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub media_type: MediaType,
    pub position: i32,
    pub duration_ms: Option<i64>,
    pub source_url: Option<String>,
    pub metadata: serde_json::Value,
}
