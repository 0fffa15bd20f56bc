//! Closed-vocabulary enforcement shared by every structured teardown field.
//!
//! One registry, one error type. Extending a taxonomy is a coordinated
//! schema-and-code change, never a runtime affordance.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyKind {
    EvidenceType,
    SpeakerRole,
    SignalModality,
    SignalCategory,
    NarrativeBeat,
    ProofType,
    CtaKind,
    VerificationStatus,
    ProductionRequirementType,
    AdCopyField,
    FunnelStage,
    AssertionType,
}

impl TaxonomyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyKind::EvidenceType => "evidence_type",
            TaxonomyKind::SpeakerRole => "speaker_role",
            TaxonomyKind::SignalModality => "signal_modality",
            TaxonomyKind::SignalCategory => "signal_category",
            TaxonomyKind::NarrativeBeat => "narrative_beat",
            TaxonomyKind::ProofType => "proof_type",
            TaxonomyKind::CtaKind => "cta_kind",
            TaxonomyKind::VerificationStatus => "verification_status",
            TaxonomyKind::ProductionRequirementType => "production_requirement_type",
            TaxonomyKind::AdCopyField => "ad_copy_field",
            TaxonomyKind::FunnelStage => "funnel_stage",
            TaxonomyKind::AssertionType => "assertion_type",
        }
    }

    /// The ordered closed set registered for this kind.
    pub fn allowed(&self) -> &'static [&'static str] {
        match self {
            TaxonomyKind::EvidenceType => &[
                "transcript_segment",
                "storyboard_scene",
                "numeric_claim",
                "targeting_signal",
                "narrative_beat",
                "proof_usage",
                "cta",
                "production_requirement",
                "ad_copy_block",
            ],
            TaxonomyKind::SpeakerRole => &["narrator", "founder", "customer", "creator", "expert"],
            TaxonomyKind::SignalModality => {
                &["visual", "verbal", "text_overlay", "audio", "contextual"]
            }
            TaxonomyKind::SignalCategory => &[
                "demographic",
                "psychographic",
                "condition",
                "life_stage",
                "occupation",
                "interest",
            ],
            TaxonomyKind::NarrativeBeat => &[
                "hook",
                "problem",
                "agitation",
                "solution",
                "mechanism",
                "proof",
                "offer",
                "urgency",
                "cta",
            ],
            TaxonomyKind::ProofType => &[
                "testimonial",
                "before_after",
                "demonstration",
                "statistic",
                "expert_endorsement",
                "social_count",
                "press_mention",
                "certification",
                "guarantee",
            ],
            TaxonomyKind::CtaKind => &[
                "shop_now",
                "learn_more",
                "sign_up",
                "download",
                "book_now",
                "get_offer",
                "subscribe",
            ],
            TaxonomyKind::VerificationStatus => {
                &["verified", "unverified", "disputed", "unverifiable"]
            }
            TaxonomyKind::ProductionRequirementType => &[
                "talent",
                "location",
                "props",
                "wardrobe",
                "equipment",
                "editing",
                "licensing",
            ],
            TaxonomyKind::AdCopyField => &[
                "primary_text",
                "headline",
                "description",
                "display_link",
                "cta_label",
            ],
            TaxonomyKind::FunnelStage => &["awareness", "consideration", "conversion", "retention"],
            TaxonomyKind::AssertionType => &[
                "why_it_wins",
                "predicted_audience",
                "awareness_stage",
                "repels",
                "algorithmic_thesis",
            ],
        }
    }
}

impl std::fmt::Display for TaxonomyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value outside its closed set. Carries the full allowed set so callers
/// can surface it verbatim; never silently coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} \"{value}\" (allowed: {})", allowed.join(", "))]
pub struct TaxonomyError {
    pub kind: TaxonomyKind,
    pub value: String,
    pub allowed: &'static [&'static str],
}

/// Normalize a candidate key and check membership in the closed set for
/// `kind`. Returns the normalized key.
pub fn assert_key(kind: TaxonomyKind, value: &str) -> Result<String, TaxonomyError> {
    let normalized = normalize_key(value);
    if kind.allowed().contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(TaxonomyError {
            kind,
            value: value.to_string(),
            allowed: kind.allowed(),
        })
    }
}

/// `allow_none` form of [`assert_key`]: `None` and blank values pass through
/// as `None`.
pub fn assert_key_opt(
    kind: TaxonomyKind,
    value: Option<&str>,
) -> Result<Option<String>, TaxonomyError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => assert_key(kind, v).map(Some),
    }
}

/// [`assert_key`] applied to every entry; blank entries are violations here.
pub fn assert_many(
    kind: TaxonomyKind,
    values: &[impl AsRef<str>],
) -> Result<Vec<String>, TaxonomyError> {
    values.iter().map(|v| assert_key(kind, v.as_ref())).collect()
}

/// Unicode-aware lowercase, trim, internal whitespace collapsed to single
/// spaces.
fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
