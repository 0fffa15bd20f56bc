//! Ad and media-asset repository, plus persistence for derived AdFacts.

use sqlx::PgPool;
use uuid::Uuid;

use adlens_common::{Ad, AdStatus, Channel, MediaAsset, MediaType};
use adlens_facts::AdFacts;

use crate::error::Result;

/// An ad as delivered by a channel-specific ingestion adapter.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub id: Uuid,
    pub org_id: Uuid,
    pub brand_id: Uuid,
    pub channel: Channel,
    pub status: AdStatus,
    pub external_id: Option<String>,
    pub raw_payload: serde_json::Value,
    pub started_running_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_running_at: Option<chrono::DateTime<chrono::Utc>>,
    pub first_seen_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_seen_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One incoming media asset; position is assigned from list order.
#[derive(Debug, Clone)]
pub struct NewMediaAsset {
    pub media_type: MediaType,
    pub duration_ms: Option<i64>,
    pub source_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct AdStore {
    pool: PgPool,
}

impl AdStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an ad, or refresh status/dates/payload on re-crawl. Identity
    /// fields never change; `first_seen_at` keeps the earliest sighting and
    /// `last_seen_at` the latest.
    pub async fn upsert_ad(&self, ad: NewAd) -> Result<Ad> {
        sqlx::query_as::<_, Ad>(
            r#"
            INSERT INTO ads
                (id, org_id, brand_id, channel, status, external_id, raw_payload,
                 started_running_at, ended_running_at, first_seen_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status             = EXCLUDED.status,
                external_id        = COALESCE(EXCLUDED.external_id, ads.external_id),
                raw_payload        = EXCLUDED.raw_payload,
                started_running_at = COALESCE(EXCLUDED.started_running_at, ads.started_running_at),
                ended_running_at   = COALESCE(EXCLUDED.ended_running_at, ads.ended_running_at),
                first_seen_at      = LEAST(
                                         COALESCE(ads.first_seen_at, EXCLUDED.first_seen_at),
                                         COALESCE(EXCLUDED.first_seen_at, ads.first_seen_at)),
                last_seen_at       = GREATEST(
                                         COALESCE(ads.last_seen_at, EXCLUDED.last_seen_at),
                                         COALESCE(EXCLUDED.last_seen_at, ads.last_seen_at)),
                updated_at         = now()
            RETURNING *
            "#,
        )
        .bind(ad.id)
        .bind(ad.org_id)
        .bind(ad.brand_id)
        .bind(ad.channel)
        .bind(ad.status)
        .bind(&ad.external_id)
        .bind(&ad.raw_payload)
        .bind(ad.started_running_at)
        .bind(ad.ended_running_at)
        .bind(ad.first_seen_at)
        .bind(ad.last_seen_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_ad(&self, org_id: Uuid, ad_id: Uuid) -> Result<Option<Ad>> {
        sqlx::query_as::<_, Ad>("SELECT * FROM ads WHERE id = $1 AND org_id = $2")
            .bind(ad_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// Replace the full ordered asset list for an ad. Delete then reinsert in
    /// one transaction, never a partial patch.
    pub async fn replace_media_assets(
        &self,
        ad_id: Uuid,
        assets: &[NewMediaAsset],
    ) -> Result<Vec<MediaAsset>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM media_assets WHERE ad_id = $1")
            .bind(ad_id)
            .execute(&mut *tx)
            .await?;

        let mut rows = Vec::with_capacity(assets.len());
        for (position, asset) in assets.iter().enumerate() {
            let row = sqlx::query_as::<_, MediaAsset>(
                r#"
                INSERT INTO media_assets
                    (id, ad_id, media_type, position, duration_ms, source_url, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(ad_id)
            .bind(asset.media_type)
            .bind(position as i32)
            .bind(asset.duration_ms)
            .bind(&asset.source_url)
            .bind(&asset.metadata)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    pub async fn media_for_ad(&self, ad_id: Uuid) -> Result<Vec<MediaAsset>> {
        sqlx::query_as::<_, MediaAsset>(
            "SELECT * FROM media_assets WHERE ad_id = $1 ORDER BY position ASC",
        )
        .bind(ad_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}

/// Persistence for the derived analytics row. One row per ad, fully replaced
/// on each derivation.
#[derive(Clone)]
pub struct FactsStore {
    pool: PgPool,
}

impl FactsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_facts(&self, facts: &AdFacts) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ad_facts
                (ad_id, display_format, video_length_seconds, media_types,
                 language_codes, country_codes, start_date, days_active, derived_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (ad_id) DO UPDATE SET
                display_format       = EXCLUDED.display_format,
                video_length_seconds = EXCLUDED.video_length_seconds,
                media_types          = EXCLUDED.media_types,
                language_codes       = EXCLUDED.language_codes,
                country_codes        = EXCLUDED.country_codes,
                start_date           = EXCLUDED.start_date,
                days_active          = EXCLUDED.days_active,
                derived_at           = EXCLUDED.derived_at
            "#,
        )
        .bind(facts.ad_id)
        .bind(&facts.display_format)
        .bind(facts.video_length_seconds)
        .bind(&facts.media_types)
        .bind(&facts.language_codes)
        .bind(&facts.country_codes)
        .bind(facts.start_date)
        .bind(facts.days_active)
        .bind(facts.derived_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_facts(&self, ad_id: Uuid) -> Result<Option<AdFacts>> {
        sqlx::query_as::<_, AdFacts>("SELECT * FROM ad_facts WHERE ad_id = $1")
            .bind(ad_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }
}
