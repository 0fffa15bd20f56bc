//! CreativeFingerprintIndex — assigns a stable Creative identity to an ad.
//!
//! Creation races between concurrent ingestion workers are resolved by
//! insert-then-recover (ON CONFLICT DO NOTHING, re-select the winner), not by
//! pre-acquired locks. Membership is one creative per ad for the ad's
//! lifetime; a repoint attempt is a hard integrity error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use adlens_common::Channel;

use crate::error::{Result, StoreError};

/// The unique identity key of a creative. `fingerprint_algo` partitions the
/// key space; a new algorithm never touches existing creatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreativeKey {
    pub org_id: Uuid,
    pub brand_id: Uuid,
    pub channel: Channel,
    pub fingerprint_algo: String,
    pub creative_fingerprint: String,
}

/// Advisory fingerprints stored on the creative row for near-duplicate
/// queries. Never consulted during identity resolution.
#[derive(Debug, Clone, Default)]
pub struct SecondaryFingerprints {
    pub media_fingerprint: Option<String>,
    pub copy_fingerprint: Option<String>,
}

/// Canonical dedup identity. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Creative {
    pub id: Uuid,
    pub org_id: Uuid,
    pub brand_id: Uuid,
    pub channel: Channel,
    pub fingerprint_algo: String,
    pub creative_fingerprint: String,
    pub media_fingerprint: Option<String>,
    pub copy_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CreativeIndex {
    pool: PgPool,
}

impl CreativeIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve (or create) the creative for `key` and upsert the ad's
    /// membership. Returns the creative with any advisory fingerprints
    /// persisted. Fails with [`StoreError::MembershipConflict`] if the ad
    /// already belongs to a different creative.
    pub async fn assign(
        &self,
        key: &CreativeKey,
        secondary: &SecondaryFingerprints,
        ad_id: Uuid,
    ) -> Result<Creative> {
        let mut creative = match self.find_by_key(key).await? {
            Some(existing) => {
                debug!(creative_id = %existing.id, ad_id = %ad_id, "Reusing creative (fingerprint match)");
                existing
            }
            None => self.insert_or_recover(key).await?,
        };

        // Advisory columns fill in once and stay put; COALESCE keeps the
        // earliest observed value.
        if secondary.media_fingerprint.is_some() || secondary.copy_fingerprint.is_some() {
            creative = sqlx::query_as::<_, Creative>(
                r#"
                UPDATE creatives SET
                    media_fingerprint = COALESCE(media_fingerprint, $2),
                    copy_fingerprint  = COALESCE(copy_fingerprint, $3)
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(creative.id)
            .bind(&secondary.media_fingerprint)
            .bind(&secondary.copy_fingerprint)
            .fetch_one(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO creative_memberships (ad_id, creative_id, org_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (ad_id) DO NOTHING
            "#,
        )
        .bind(ad_id)
        .bind(creative.id)
        .bind(key.org_id)
        .execute(&self.pool)
        .await?;

        // Re-check: a concurrent assignment of the same ad converges here,
        // and a membership pointing elsewhere must surface, not move.
        let (member_of,): (Uuid,) =
            sqlx::query_as("SELECT creative_id FROM creative_memberships WHERE ad_id = $1")
                .bind(ad_id)
                .fetch_one(&self.pool)
                .await?;
        if member_of != creative.id {
            return Err(StoreError::MembershipConflict {
                ad_id,
                existing: member_of,
                incoming: creative.id,
            });
        }

        Ok(creative)
    }

    /// Optimistic insert: when the returning insert comes back empty, a
    /// concurrent worker won the race -- re-select the winning row. Expected
    /// path under concurrent ingestion, not a failure.
    async fn insert_or_recover(&self, key: &CreativeKey) -> Result<Creative> {
        let inserted = sqlx::query_as::<_, Creative>(
            r#"
            INSERT INTO creatives
                (id, org_id, brand_id, channel, fingerprint_algo, creative_fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (org_id, brand_id, channel, fingerprint_algo, creative_fingerprint)
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.org_id)
        .bind(key.brand_id)
        .bind(key.channel)
        .bind(&key.fingerprint_algo)
        .bind(&key.creative_fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(creative) => {
                info!(creative_id = %creative.id, channel = %key.channel, "Created creative");
                Ok(creative)
            }
            None => {
                debug!(fingerprint = %key.creative_fingerprint, "Lost creative insert race, re-selecting winner");
                self.find_by_key(key)
                    .await?
                    .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
            }
        }
    }

    pub async fn find_by_key(&self, key: &CreativeKey) -> Result<Option<Creative>> {
        sqlx::query_as::<_, Creative>(
            r#"
            SELECT * FROM creatives
            WHERE org_id = $1 AND brand_id = $2 AND channel = $3
              AND fingerprint_algo = $4 AND creative_fingerprint = $5
            "#,
        )
        .bind(key.org_id)
        .bind(key.brand_id)
        .bind(key.channel)
        .bind(&key.fingerprint_algo)
        .bind(&key.creative_fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_ad(&self, org_id: Uuid, ad_id: Uuid) -> Result<Option<Creative>> {
        sqlx::query_as::<_, Creative>(
            r#"
            SELECT c.* FROM creatives c
            JOIN creative_memberships m ON m.creative_id = c.id
            WHERE m.ad_id = $1 AND m.org_id = $2 AND c.org_id = $2
            "#,
        )
        .bind(ad_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Creatives in the same org sharing a media or copy fingerprint with
    /// this one but carrying a different primary fingerprint. Advisory only.
    pub async fn near_duplicates(&self, org_id: Uuid, creative_id: Uuid) -> Result<Vec<Creative>> {
        sqlx::query_as::<_, Creative>(
            r#"
            SELECT c2.* FROM creatives c1
            JOIN creatives c2 ON c2.org_id = c1.org_id
              AND c2.id <> c1.id
              AND c2.creative_fingerprint <> c1.creative_fingerprint
              AND ((c1.media_fingerprint IS NOT NULL AND c2.media_fingerprint = c1.media_fingerprint)
                OR (c1.copy_fingerprint IS NOT NULL AND c2.copy_fingerprint = c1.copy_fingerprint))
            WHERE c1.id = $1 AND c1.org_id = $2
            ORDER BY c2.created_at ASC
            "#,
        )
        .bind(creative_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}
