//! TeardownStore — validated, transactional persistence for structured
//! teardown analyses.
//!
//! Everything is validated before any write. The canonical swap (demote the
//! old row, then insert the new one) and the child replacement (delete, then
//! reinsert) happen inside one transaction, so no reader ever observes two
//! canonical rows or an evidence/assertion mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use adlens_common::taxonomy::{self, TaxonomyKind};

use crate::error::{is_unique_violation, Result, StoreError};
use crate::evidence::{EvidenceBody, EvidenceItem, EvidenceItemInput};

/// A persisted teardown header row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Teardown {
    pub id: Uuid,
    pub org_id: Uuid,
    pub creative_id: Uuid,
    pub ad_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub research_run_id: Option<Uuid>,
    pub is_canonical: bool,
    pub summary: Option<String>,
    pub funnel_stage: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted assertion row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assertion {
    pub id: Uuid,
    pub teardown_id: Uuid,
    pub org_id: Uuid,
    pub position: i32,
    pub assertion_type: String,
    pub claim: String,
    pub confidence: Option<f32>,
    pub evidence_refs: Vec<Uuid>,
}

/// One assertion in an upsert payload. `evidence_refs` must resolve to
/// evidence item ids in the same payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionInput {
    pub assertion_type: String,
    pub claim: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub evidence_refs: Vec<Uuid>,
}

impl AssertionInput {
    pub fn new(assertion_type: impl Into<String>, claim: impl Into<String>) -> Self {
        Self {
            assertion_type: assertion_type.into(),
            claim: claim.into(),
            confidence: None,
            evidence_refs: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_evidence_refs(mut self, refs: Vec<Uuid>) -> Self {
        self.evidence_refs = refs;
        self
    }
}

/// A full teardown upsert request. The caller builds this; the store assigns
/// the id unless one is given for an update-in-place.
#[derive(Debug, Clone)]
pub struct TeardownUpsert {
    pub org_id: Uuid,
    pub creative_id: Uuid,
    pub id: Option<Uuid>,
    pub ad_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub research_run_id: Option<Uuid>,
    pub summary: Option<String>,
    pub funnel_stage: Option<String>,
    pub source: Option<String>,
    pub canonical: bool,
    pub evidence_items: Vec<EvidenceItemInput>,
    pub assertions: Vec<AssertionInput>,
}

impl TeardownUpsert {
    pub fn new(org_id: Uuid, creative_id: Uuid) -> Self {
        Self {
            org_id,
            creative_id,
            id: None,
            ad_id: None,
            client_id: None,
            campaign_id: None,
            research_run_id: None,
            summary: None,
            funnel_stage: None,
            source: None,
            canonical: true,
            evidence_items: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_ad(mut self, ad_id: Uuid) -> Self {
        self.ad_id = Some(ad_id);
        self
    }

    pub fn with_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_campaign(mut self, campaign_id: Uuid) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    pub fn with_research_run(mut self, research_run_id: Uuid) -> Self {
        self.research_run_id = Some(research_run_id);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_funnel_stage(mut self, stage: impl Into<String>) -> Self {
        self.funnel_stage = Some(stage.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn non_canonical(mut self) -> Self {
        self.canonical = false;
        self
    }

    pub fn with_evidence(mut self, items: Vec<EvidenceItemInput>) -> Self {
        self.evidence_items = items;
        self
    }

    pub fn with_assertions(mut self, assertions: Vec<AssertionInput>) -> Self {
        self.assertions = assertions;
        self
    }
}

/// A teardown with its owned children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownBundle {
    pub teardown: Teardown,
    pub evidence_items: Vec<EvidenceItem>,
    pub assertions: Vec<Assertion>,
}

/// At most one structured filter per search.
#[derive(Debug, Clone)]
pub enum TeardownFacet {
    ProofType(String),
    BeatKey(String),
    SignalCategory(String),
    NumericUnit(String),
    ClaimTopic(String),
    ClaimTextContains(String),
}

#[derive(Debug, Clone, Default)]
pub struct TeardownFilter {
    pub client_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub facet: Option<TeardownFacet>,
    pub include_non_canonical: bool,
    pub limit: Option<i64>,
}

impl TeardownFilter {
    pub fn with_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_campaign(mut self, campaign_id: Uuid) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    pub fn with_facet(mut self, facet: TeardownFacet) -> Self {
        self.facet = Some(facet);
        self
    }

    pub fn include_non_canonical(mut self) -> Self {
        self.include_non_canonical = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

const SEARCH_LIMIT_DEFAULT: i64 = 50;
const SEARCH_LIMIT_MAX: i64 = 200;

#[derive(Clone)]
pub struct TeardownStore {
    pool: PgPool,
}

impl TeardownStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate and persist one teardown with its children. When writing a
    /// canonical row, any existing canonical teardown for the creative is
    /// demoted first, inside the same transaction. Children are replaced
    /// wholesale. Concurrent canonical upserts for the same creative resolve
    /// to last-committer-wins; the loser of a same-instant insert race is
    /// retried once.
    pub async fn upsert(&self, req: TeardownUpsert) -> Result<TeardownBundle> {
        // Validate everything before any write.
        let funnel_stage =
            taxonomy::assert_key_opt(TaxonomyKind::FunnelStage, req.funnel_stage.as_deref())?;

        let mut ids: HashSet<Uuid> = HashSet::with_capacity(req.evidence_items.len());
        let mut evidence: Vec<(Uuid, EvidenceBody)> = Vec::with_capacity(req.evidence_items.len());
        for item in &req.evidence_items {
            if !ids.insert(item.id) {
                return Err(StoreError::DuplicateEvidenceId(item.id));
            }
            evidence.push((item.id, item.body.validated()?));
        }

        let mut assertions: Vec<AssertionInput> = Vec::with_capacity(req.assertions.len());
        for (assertion_index, assertion) in req.assertions.iter().enumerate() {
            let assertion_type =
                taxonomy::assert_key(TaxonomyKind::AssertionType, &assertion.assertion_type)?;
            for evidence_id in &assertion.evidence_refs {
                if !ids.contains(evidence_id) {
                    return Err(StoreError::UnknownEvidenceRef {
                        assertion_index,
                        evidence_id: *evidence_id,
                    });
                }
            }
            assertions.push(AssertionInput {
                assertion_type,
                ..assertion.clone()
            });
        }

        let creative: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM creatives WHERE id = $1 AND org_id = $2")
                .bind(req.creative_id)
                .bind(req.org_id)
                .fetch_optional(&self.pool)
                .await?;
        if creative.is_none() {
            return Err(StoreError::MissingCreative(req.creative_id));
        }

        // Two workers inserting the first canonical row at the same instant
        // race on the partial unique index; the loser retries against the
        // committed winner and demotes it.
        let mut attempt = 0;
        let teardown_id = loop {
            match self.write(&req, &funnel_stage, &evidence, &assertions).await {
                Ok(id) => break id,
                Err(err) if is_unique_violation(&err) && attempt == 0 => {
                    debug!(creative_id = %req.creative_id, "Lost canonical insert race, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        info!(
            teardown_id = %teardown_id,
            creative_id = %req.creative_id,
            evidence = evidence.len(),
            assertions = assertions.len(),
            canonical = req.canonical,
            "Upserted teardown"
        );

        self.get(req.org_id, teardown_id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// One transaction: demote-then-insert for the canonical flag, then
    /// delete-and-reinsert of all children.
    async fn write(
        &self,
        req: &TeardownUpsert,
        funnel_stage: &Option<String>,
        evidence: &[(Uuid, EvidenceBody)],
        assertions: &[AssertionInput],
    ) -> Result<Uuid> {
        let teardown_id = req.id.unwrap_or_else(Uuid::new_v4);
        let mut tx = self.pool.begin().await?;

        if req.canonical {
            sqlx::query(
                r#"
                UPDATE teardowns SET is_canonical = FALSE, updated_at = now()
                WHERE org_id = $1 AND creative_id = $2 AND is_canonical AND id <> $3
                "#,
            )
            .bind(req.org_id)
            .bind(req.creative_id)
            .bind(teardown_id)
            .execute(&mut *tx)
            .await?;
        }

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO teardowns
                (id, org_id, creative_id, ad_id, client_id, campaign_id,
                 research_run_id, is_canonical, summary, funnel_stage, source)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                ad_id           = EXCLUDED.ad_id,
                client_id       = EXCLUDED.client_id,
                campaign_id     = EXCLUDED.campaign_id,
                research_run_id = EXCLUDED.research_run_id,
                is_canonical    = EXCLUDED.is_canonical,
                summary         = EXCLUDED.summary,
                funnel_stage    = EXCLUDED.funnel_stage,
                source          = EXCLUDED.source,
                updated_at      = now()
            WHERE teardowns.org_id = EXCLUDED.org_id
              AND teardowns.creative_id = EXCLUDED.creative_id
            RETURNING id
            "#,
        )
        .bind(teardown_id)
        .bind(req.org_id)
        .bind(req.creative_id)
        .bind(req.ad_id)
        .bind(req.client_id)
        .bind(req.campaign_id)
        .bind(req.research_run_id)
        .bind(req.canonical)
        .bind(&req.summary)
        .bind(funnel_stage)
        .bind(&req.source)
        .fetch_optional(&mut *tx)
        .await?;

        // The update guard refuses an id that belongs to another org or
        // creative.
        if row.is_none() {
            return Err(StoreError::TeardownIdConflict(teardown_id));
        }

        sqlx::query("DELETE FROM evidence_items WHERE teardown_id = $1")
            .bind(teardown_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM assertions WHERE teardown_id = $1")
            .bind(teardown_id)
            .execute(&mut *tx)
            .await?;

        for (position, (id, body)) in evidence.iter().enumerate() {
            let flat = body.flatten();
            sqlx::query(
                r#"
                INSERT INTO evidence_items
                    (id, teardown_id, org_id, evidence_type, position,
                     speaker_role, text, start_seconds, end_seconds,
                     scene_index, description, on_screen_text, duration_seconds,
                     value, unit, claim_text, claim_topic, verification_status, source_url,
                     modality, category, beat_key, timestamp_seconds,
                     proof_type, cta_kind, placement, requirement_type, copy_field)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                        $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
                "#,
            )
            .bind(id)
            .bind(teardown_id)
            .bind(req.org_id)
            .bind(body.evidence_type())
            .bind(position as i32)
            .bind(&flat.speaker_role)
            .bind(&flat.text)
            .bind(flat.start_seconds)
            .bind(flat.end_seconds)
            .bind(flat.scene_index)
            .bind(&flat.description)
            .bind(&flat.on_screen_text)
            .bind(flat.duration_seconds)
            .bind(flat.value)
            .bind(&flat.unit)
            .bind(&flat.claim_text)
            .bind(&flat.claim_topic)
            .bind(&flat.verification_status)
            .bind(&flat.source_url)
            .bind(&flat.modality)
            .bind(&flat.category)
            .bind(&flat.beat_key)
            .bind(flat.timestamp_seconds)
            .bind(&flat.proof_type)
            .bind(&flat.cta_kind)
            .bind(&flat.placement)
            .bind(&flat.requirement_type)
            .bind(&flat.copy_field)
            .execute(&mut *tx)
            .await?;
        }

        for (position, assertion) in assertions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO assertions
                    (id, teardown_id, org_id, position, assertion_type, claim,
                     confidence, evidence_refs)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(teardown_id)
            .bind(req.org_id)
            .bind(position as i32)
            .bind(&assertion.assertion_type)
            .bind(&assertion.claim)
            .bind(assertion.confidence)
            .bind(&assertion.evidence_refs)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(teardown_id)
    }

    pub async fn get(&self, org_id: Uuid, teardown_id: Uuid) -> Result<Option<TeardownBundle>> {
        let teardown = sqlx::query_as::<_, Teardown>(
            "SELECT * FROM teardowns WHERE id = $1 AND org_id = $2",
        )
        .bind(teardown_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        match teardown {
            Some(teardown) => Ok(Some(self.load_bundle(teardown).await?)),
            None => Ok(None),
        }
    }

    pub async fn canonical_for_creative(
        &self,
        org_id: Uuid,
        creative_id: Uuid,
    ) -> Result<Option<TeardownBundle>> {
        let teardown = sqlx::query_as::<_, Teardown>(
            "SELECT * FROM teardowns WHERE org_id = $1 AND creative_id = $2 AND is_canonical",
        )
        .bind(org_id)
        .bind(creative_id)
        .fetch_optional(&self.pool)
        .await?;

        match teardown {
            Some(teardown) => Ok(Some(self.load_bundle(teardown).await?)),
            None => Ok(None),
        }
    }

    /// Canonical teardown of the creative the ad belongs to, via membership.
    pub async fn canonical_for_ad(
        &self,
        org_id: Uuid,
        ad_id: Uuid,
    ) -> Result<Option<TeardownBundle>> {
        let teardown = sqlx::query_as::<_, Teardown>(
            r#"
            SELECT t.* FROM teardowns t
            JOIN creative_memberships m ON m.creative_id = t.creative_id
            WHERE m.ad_id = $1 AND m.org_id = $2 AND t.org_id = $2 AND t.is_canonical
            "#,
        )
        .bind(ad_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        match teardown {
            Some(teardown) => Ok(Some(self.load_bundle(teardown).await?)),
            None => Ok(None),
        }
    }

    /// Filtered search over teardown headers. Canonical rows only unless the
    /// filter opts in; taxonomy-backed facets are validated before querying.
    pub async fn search(&self, org_id: Uuid, filter: TeardownFilter) -> Result<Vec<Teardown>> {
        let facet_value: Option<String> = match &filter.facet {
            None => None,
            Some(TeardownFacet::ProofType(key)) => {
                Some(taxonomy::assert_key(TaxonomyKind::ProofType, key)?)
            }
            Some(TeardownFacet::BeatKey(key)) => {
                Some(taxonomy::assert_key(TaxonomyKind::NarrativeBeat, key)?)
            }
            Some(TeardownFacet::SignalCategory(key)) => {
                Some(taxonomy::assert_key(TaxonomyKind::SignalCategory, key)?)
            }
            Some(TeardownFacet::NumericUnit(unit)) => Some(unit.trim().to_string()),
            Some(TeardownFacet::ClaimTopic(topic)) => Some(topic.trim().to_string()),
            Some(TeardownFacet::ClaimTextContains(needle)) => {
                Some(format!("%{}%", escape_like(needle)))
            }
        };

        let facet_clause = match &filter.facet {
            None => "",
            Some(TeardownFacet::ProofType(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'proof_usage' AND e.proof_type = $5)"
            }
            Some(TeardownFacet::BeatKey(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'narrative_beat' AND e.beat_key = $5)"
            }
            Some(TeardownFacet::SignalCategory(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'targeting_signal' AND e.category = $5)"
            }
            Some(TeardownFacet::NumericUnit(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'numeric_claim' AND e.unit = $5)"
            }
            Some(TeardownFacet::ClaimTopic(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'numeric_claim' AND e.claim_topic = $5)"
            }
            Some(TeardownFacet::ClaimTextContains(_)) => {
                " AND EXISTS (SELECT 1 FROM evidence_items e WHERE e.teardown_id = t.id \
                 AND e.evidence_type = 'numeric_claim' AND e.claim_text ILIKE $5)"
            }
        };

        let limit = filter
            .limit
            .unwrap_or(SEARCH_LIMIT_DEFAULT)
            .clamp(1, SEARCH_LIMIT_MAX);

        let mut sql = String::from(
            "SELECT t.* FROM teardowns t \
             WHERE t.org_id = $1 \
             AND ($2::uuid IS NULL OR t.client_id = $2) \
             AND ($3::uuid IS NULL OR t.campaign_id = $3) \
             AND ($4 OR t.is_canonical)",
        );
        sql.push_str(facet_clause);
        sql.push_str(if facet_value.is_some() {
            " ORDER BY t.updated_at DESC LIMIT $6"
        } else {
            " ORDER BY t.updated_at DESC LIMIT $5"
        });

        let mut query = sqlx::query_as::<_, Teardown>(&sql)
            .bind(org_id)
            .bind(filter.client_id)
            .bind(filter.campaign_id)
            .bind(filter.include_non_canonical);
        if let Some(value) = facet_value {
            query = query.bind(value);
        }
        query = query.bind(limit);

        query.fetch_all(&self.pool).await.map_err(Into::into)
    }

    async fn load_bundle(&self, teardown: Teardown) -> Result<TeardownBundle> {
        let evidence_items = sqlx::query_as::<_, EvidenceItem>(
            "SELECT * FROM evidence_items WHERE teardown_id = $1 ORDER BY position ASC",
        )
        .bind(teardown.id)
        .fetch_all(&self.pool)
        .await?;

        let assertions = sqlx::query_as::<_, Assertion>(
            "SELECT * FROM assertions WHERE teardown_id = $1 ORDER BY position ASC",
        )
        .bind(teardown.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TeardownBundle {
            teardown,
            evidence_items,
            assertions,
        })
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
