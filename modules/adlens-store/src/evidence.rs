//! Evidence items — typed atomic observations belonging to a teardown.
//!
//! Modeled as a real sum type, one variant per `evidence_type`, each carrying
//! only its own fields. Storage flattens the union into one sparse wide row;
//! the variant is validated before anything is written.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adlens_common::taxonomy::{assert_key, assert_key_opt, TaxonomyError, TaxonomyKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "evidence_type", rename_all = "snake_case")]
pub enum EvidenceBody {
    TranscriptSegment {
        speaker_role: String,
        text: String,
        #[serde(default)]
        start_seconds: Option<f64>,
        #[serde(default)]
        end_seconds: Option<f64>,
    },
    StoryboardScene {
        scene_index: i32,
        description: String,
        #[serde(default)]
        on_screen_text: Option<String>,
        #[serde(default)]
        duration_seconds: Option<f64>,
    },
    NumericClaim {
        value: f64,
        unit: String,
        claim_text: String,
        #[serde(default)]
        claim_topic: Option<String>,
        verification_status: String,
        #[serde(default)]
        source_url: Option<String>,
    },
    TargetingSignal {
        modality: String,
        category: String,
        description: String,
    },
    NarrativeBeat {
        beat_key: String,
        description: String,
        #[serde(default)]
        timestamp_seconds: Option<f64>,
    },
    ProofUsage {
        proof_type: String,
        description: String,
    },
    Cta {
        cta_kind: String,
        text: String,
        #[serde(default)]
        placement: Option<String>,
    },
    ProductionRequirement {
        requirement_type: String,
        description: String,
    },
    AdCopyBlock {
        field: String,
        text: String,
    },
}

impl EvidenceBody {
    pub fn evidence_type(&self) -> &'static str {
        match self {
            EvidenceBody::TranscriptSegment { .. } => "transcript_segment",
            EvidenceBody::StoryboardScene { .. } => "storyboard_scene",
            EvidenceBody::NumericClaim { .. } => "numeric_claim",
            EvidenceBody::TargetingSignal { .. } => "targeting_signal",
            EvidenceBody::NarrativeBeat { .. } => "narrative_beat",
            EvidenceBody::ProofUsage { .. } => "proof_usage",
            EvidenceBody::Cta { .. } => "cta",
            EvidenceBody::ProductionRequirement { .. } => "production_requirement",
            EvidenceBody::AdCopyBlock { .. } => "ad_copy_block",
        }
    }

    /// Check every taxonomy-backed field against its closed set, returning a
    /// copy with normalized keys. Free-form fields pass through untouched.
    pub fn validated(&self) -> Result<EvidenceBody, TaxonomyError> {
        let validated = match self.clone() {
            EvidenceBody::TranscriptSegment {
                speaker_role,
                text,
                start_seconds,
                end_seconds,
            } => EvidenceBody::TranscriptSegment {
                speaker_role: assert_key(TaxonomyKind::SpeakerRole, &speaker_role)?,
                text,
                start_seconds,
                end_seconds,
            },
            scene @ EvidenceBody::StoryboardScene { .. } => scene,
            EvidenceBody::NumericClaim {
                value,
                unit,
                claim_text,
                claim_topic,
                verification_status,
                source_url,
            } => EvidenceBody::NumericClaim {
                value,
                unit,
                claim_text,
                claim_topic,
                verification_status: assert_key(
                    TaxonomyKind::VerificationStatus,
                    &verification_status,
                )?,
                source_url,
            },
            EvidenceBody::TargetingSignal {
                modality,
                category,
                description,
            } => EvidenceBody::TargetingSignal {
                modality: assert_key(TaxonomyKind::SignalModality, &modality)?,
                category: assert_key(TaxonomyKind::SignalCategory, &category)?,
                description,
            },
            EvidenceBody::NarrativeBeat {
                beat_key,
                description,
                timestamp_seconds,
            } => EvidenceBody::NarrativeBeat {
                beat_key: assert_key(TaxonomyKind::NarrativeBeat, &beat_key)?,
                description,
                timestamp_seconds,
            },
            EvidenceBody::ProofUsage {
                proof_type,
                description,
            } => EvidenceBody::ProofUsage {
                proof_type: assert_key(TaxonomyKind::ProofType, &proof_type)?,
                description,
            },
            EvidenceBody::Cta {
                cta_kind,
                text,
                placement,
            } => EvidenceBody::Cta {
                cta_kind: assert_key(TaxonomyKind::CtaKind, &cta_kind)?,
                text,
                placement,
            },
            EvidenceBody::ProductionRequirement {
                requirement_type,
                description,
            } => EvidenceBody::ProductionRequirement {
                requirement_type: assert_key(
                    TaxonomyKind::ProductionRequirementType,
                    &requirement_type,
                )?,
                description,
            },
            EvidenceBody::AdCopyBlock { field, text } => EvidenceBody::AdCopyBlock {
                field: assert_key(TaxonomyKind::AdCopyField, &field)?,
                text,
            },
        };
        Ok(validated)
    }

    /// Sparse wide-row projection for storage.
    pub(crate) fn flatten(&self) -> FlatEvidence {
        let mut flat = FlatEvidence::default();
        match self.clone() {
            EvidenceBody::TranscriptSegment {
                speaker_role,
                text,
                start_seconds,
                end_seconds,
            } => {
                flat.speaker_role = Some(speaker_role);
                flat.text = Some(text);
                flat.start_seconds = start_seconds;
                flat.end_seconds = end_seconds;
            }
            EvidenceBody::StoryboardScene {
                scene_index,
                description,
                on_screen_text,
                duration_seconds,
            } => {
                flat.scene_index = Some(scene_index);
                flat.description = Some(description);
                flat.on_screen_text = on_screen_text;
                flat.duration_seconds = duration_seconds;
            }
            EvidenceBody::NumericClaim {
                value,
                unit,
                claim_text,
                claim_topic,
                verification_status,
                source_url,
            } => {
                flat.value = Some(value);
                flat.unit = Some(unit);
                flat.claim_text = Some(claim_text);
                flat.claim_topic = claim_topic;
                flat.verification_status = Some(verification_status);
                flat.source_url = source_url;
            }
            EvidenceBody::TargetingSignal {
                modality,
                category,
                description,
            } => {
                flat.modality = Some(modality);
                flat.category = Some(category);
                flat.description = Some(description);
            }
            EvidenceBody::NarrativeBeat {
                beat_key,
                description,
                timestamp_seconds,
            } => {
                flat.beat_key = Some(beat_key);
                flat.description = Some(description);
                flat.timestamp_seconds = timestamp_seconds;
            }
            EvidenceBody::ProofUsage {
                proof_type,
                description,
            } => {
                flat.proof_type = Some(proof_type);
                flat.description = Some(description);
            }
            EvidenceBody::Cta {
                cta_kind,
                text,
                placement,
            } => {
                flat.cta_kind = Some(cta_kind);
                flat.text = Some(text);
                flat.placement = placement;
            }
            EvidenceBody::ProductionRequirement {
                requirement_type,
                description,
            } => {
                flat.requirement_type = Some(requirement_type);
                flat.description = Some(description);
            }
            EvidenceBody::AdCopyBlock { field, text } => {
                flat.copy_field = Some(field);
                flat.text = Some(text);
            }
        }
        flat
    }
}

/// One evidence item in a teardown upsert payload. The id is caller-supplied
/// so assertions can reference evidence before anything is persisted; it must
/// be unique within the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItemInput {
    pub id: Uuid,
    #[serde(flatten)]
    pub body: EvidenceBody,
}

impl EvidenceItemInput {
    pub fn new(id: Uuid, body: EvidenceBody) -> Self {
        Self { id, body }
    }
}

/// An evidence item as stored, reassembled from the wide row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: Uuid,
    pub teardown_id: Uuid,
    pub org_id: Uuid,
    pub position: i32,
    #[serde(flatten)]
    pub body: EvidenceBody,
}

/// The sparse wide row. Only the columns of the item's variant are populated.
#[derive(Debug, Default)]
pub(crate) struct FlatEvidence {
    pub speaker_role: Option<String>,
    pub text: Option<String>,
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
    pub scene_index: Option<i32>,
    pub description: Option<String>,
    pub on_screen_text: Option<String>,
    pub duration_seconds: Option<f64>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub claim_text: Option<String>,
    pub claim_topic: Option<String>,
    pub verification_status: Option<String>,
    pub source_url: Option<String>,
    pub modality: Option<String>,
    pub category: Option<String>,
    pub beat_key: Option<String>,
    pub timestamp_seconds: Option<f64>,
    pub proof_type: Option<String>,
    pub cta_kind: Option<String>,
    pub placement: Option<String>,
    pub requirement_type: Option<String>,
    pub copy_field: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EvidenceItem {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let evidence_type: String = row.try_get("evidence_type")?;
        let body = match evidence_type.as_str() {
            "transcript_segment" => EvidenceBody::TranscriptSegment {
                speaker_role: row.try_get("speaker_role")?,
                text: row.try_get("text")?,
                start_seconds: row.try_get("start_seconds")?,
                end_seconds: row.try_get("end_seconds")?,
            },
            "storyboard_scene" => EvidenceBody::StoryboardScene {
                scene_index: row.try_get("scene_index")?,
                description: row.try_get("description")?,
                on_screen_text: row.try_get("on_screen_text")?,
                duration_seconds: row.try_get("duration_seconds")?,
            },
            "numeric_claim" => EvidenceBody::NumericClaim {
                value: row.try_get("value")?,
                unit: row.try_get("unit")?,
                claim_text: row.try_get("claim_text")?,
                claim_topic: row.try_get("claim_topic")?,
                verification_status: row.try_get("verification_status")?,
                source_url: row.try_get("source_url")?,
            },
            "targeting_signal" => EvidenceBody::TargetingSignal {
                modality: row.try_get("modality")?,
                category: row.try_get("category")?,
                description: row.try_get("description")?,
            },
            "narrative_beat" => EvidenceBody::NarrativeBeat {
                beat_key: row.try_get("beat_key")?,
                description: row.try_get("description")?,
                timestamp_seconds: row.try_get("timestamp_seconds")?,
            },
            "proof_usage" => EvidenceBody::ProofUsage {
                proof_type: row.try_get("proof_type")?,
                description: row.try_get("description")?,
            },
            "cta" => EvidenceBody::Cta {
                cta_kind: row.try_get("cta_kind")?,
                text: row.try_get("text")?,
                placement: row.try_get("placement")?,
            },
            "production_requirement" => EvidenceBody::ProductionRequirement {
                requirement_type: row.try_get("requirement_type")?,
                description: row.try_get("description")?,
            },
            "ad_copy_block" => EvidenceBody::AdCopyBlock {
                field: row.try_get("copy_field")?,
                text: row.try_get("text")?,
            },
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "evidence_type".to_string(),
                    source: format!("unknown evidence_type {other:?}").into(),
                })
            }
        };

        Ok(EvidenceItem {
            id: row.try_get("id")?,
            teardown_id: row.try_get("teardown_id")?,
            org_id: row.try_get("org_id")?,
            position: row.try_get("position")?,
            body,
        })
    }
}
