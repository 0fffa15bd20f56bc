//! Integration tests for the adlens stores.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests isolate themselves with fresh org/brand ids rather than truncating,
//! so the suite is safe to run in parallel against one database.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use adlens_common::{AdStatus, Channel, MediaType};
use adlens_facts::{derive_ad_facts, FINGERPRINT_ALGO};
use adlens_store::{
    AdStore, AssertionInput, Creative, CreativeIndex, CreativeKey, EvidenceBody,
    EvidenceItemInput, FactsStore, NewAd, NewMediaAsset, SecondaryFingerprints, StoreError,
    TeardownFacet, TeardownFilter, TeardownStore, TeardownUpsert,
};

/// Get a migrated test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    adlens_store::migrate(&pool).await.ok()?;
    Some(pool)
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn new_ad(org_id: Uuid, brand_id: Uuid) -> NewAd {
    NewAd {
        id: Uuid::new_v4(),
        org_id,
        brand_id,
        channel: Channel::Meta,
        status: AdStatus::Active,
        external_id: None,
        raw_payload: json!({"body": "shop the sale"}),
        started_running_at: None,
        ended_running_at: None,
        first_seen_at: None,
        last_seen_at: None,
    }
}

fn creative_key(org_id: Uuid, brand_id: Uuid, fingerprint: &str) -> CreativeKey {
    CreativeKey {
        org_id,
        brand_id,
        channel: Channel::Meta,
        fingerprint_algo: FINGERPRINT_ALGO.to_string(),
        creative_fingerprint: fingerprint.to_string(),
    }
}

/// Seed an ad and assign it a creative, returning the creative.
async fn seed_creative(pool: &PgPool, org_id: Uuid, brand_id: Uuid, fingerprint: &str) -> Creative {
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let ad = ads.upsert_ad(new_ad(org_id, brand_id)).await.unwrap();
    index
        .assign(
            &creative_key(org_id, brand_id, fingerprint),
            &SecondaryFingerprints::default(),
            ad.id,
        )
        .await
        .unwrap()
}

fn transcript(id: Uuid) -> EvidenceItemInput {
    EvidenceItemInput::new(
        id,
        EvidenceBody::TranscriptSegment {
            speaker_role: "founder".to_string(),
            text: "I built this for my own skin".to_string(),
            start_seconds: Some(0.0),
            end_seconds: Some(3.2),
        },
    )
}

fn numeric_claim(id: Uuid) -> EvidenceItemInput {
    EvidenceItemInput::new(
        id,
        EvidenceBody::NumericClaim {
            value: 97.0,
            unit: "percent".to_string(),
            claim_text: "97% saw clearer skin in 2 weeks".to_string(),
            claim_topic: Some("efficacy".to_string()),
            verification_status: "unverified".to_string(),
            source_url: None,
        },
    )
}

fn targeting(id: Uuid) -> EvidenceItemInput {
    EvidenceItemInput::new(
        id,
        EvidenceBody::TargetingSignal {
            modality: "verbal".to_string(),
            category: "demographic".to_string(),
            description: "speaks directly to new parents".to_string(),
        },
    )
}

fn proof(id: Uuid) -> EvidenceItemInput {
    EvidenceItemInput::new(
        id,
        EvidenceBody::ProofUsage {
            proof_type: "testimonial".to_string(),
            description: "customer holds up the bottle".to_string(),
        },
    )
}

// =========================================================================
// CreativeIndex
// =========================================================================

#[tokio::test]
async fn identical_key_resolves_to_same_creative() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad_a = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let ad_b = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let key = creative_key(org, brand, "fp-same");

    let first = index
        .assign(&key, &SecondaryFingerprints::default(), ad_a.id)
        .await
        .unwrap();
    let second = index
        .assign(&key, &SecondaryFingerprints::default(), ad_b.id)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(index.find_by_ad(org, ad_a.id).await.unwrap().unwrap().id, first.id);
    assert_eq!(index.find_by_ad(org, ad_b.id).await.unwrap().unwrap().id, first.id);
}

#[tokio::test]
async fn different_fingerprint_gets_distinct_creative() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad_a = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let ad_b = ads.upsert_ad(new_ad(org, brand)).await.unwrap();

    let first = index
        .assign(
            &creative_key(org, brand, "fp-one"),
            &SecondaryFingerprints::default(),
            ad_a.id,
        )
        .await
        .unwrap();
    let second = index
        .assign(
            &creative_key(org, brand, "fp-two"),
            &SecondaryFingerprints::default(),
            ad_b.id,
        )
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn concurrent_assigns_converge_on_one_creative() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad_a = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let ad_b = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let key = creative_key(org, brand, "fp-race");

    let secondary = SecondaryFingerprints::default();
    let (left, right) = tokio::join!(
        index.assign(&key, &secondary, ad_a.id),
        index.assign(&key, &secondary, ad_b.id),
    );

    assert_eq!(left.unwrap().id, right.unwrap().id);
}

#[tokio::test]
async fn membership_repoint_is_an_integrity_error() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let original = index
        .assign(
            &creative_key(org, brand, "fp-original"),
            &SecondaryFingerprints::default(),
            ad.id,
        )
        .await
        .unwrap();

    let err = index
        .assign(
            &creative_key(org, brand, "fp-elsewhere"),
            &SecondaryFingerprints::default(),
            ad.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MembershipConflict { ad_id, existing, .. }
        if ad_id == ad.id && existing == original.id));

    // The membership did not move.
    let still = index.find_by_ad(org, ad.id).await.unwrap().unwrap();
    assert_eq!(still.id, original.id);
}

#[tokio::test]
async fn secondary_fingerprints_fill_once_and_find_near_duplicates() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad_a = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let ad_b = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let ad_c = ads.upsert_ad(new_ad(org, brand)).await.unwrap();

    let with_copy = SecondaryFingerprints {
        media_fingerprint: Some("media-1".to_string()),
        copy_fingerprint: Some("copy-shared".to_string()),
    };
    let first = index
        .assign(&creative_key(org, brand, "fp-a"), &with_copy, ad_a.id)
        .await
        .unwrap();
    assert_eq!(first.copy_fingerprint.as_deref(), Some("copy-shared"));

    // A later assign with different advisory values does not overwrite.
    let other = SecondaryFingerprints {
        media_fingerprint: Some("media-other".to_string()),
        copy_fingerprint: Some("copy-other".to_string()),
    };
    let again = index
        .assign(&creative_key(org, brand, "fp-a"), &other, ad_b.id)
        .await
        .unwrap();
    assert_eq!(again.media_fingerprint.as_deref(), Some("media-1"));

    // Same copy under a different primary fingerprint is a near-duplicate.
    let cousin = SecondaryFingerprints {
        media_fingerprint: Some("media-2".to_string()),
        copy_fingerprint: Some("copy-shared".to_string()),
    };
    let second = index
        .assign(&creative_key(org, brand, "fp-b"), &cousin, ad_c.id)
        .await
        .unwrap();

    let near = index.near_duplicates(org, first.id).await.unwrap();
    assert_eq!(near.len(), 1);
    assert_eq!(near[0].id, second.id);
}

// =========================================================================
// AdStore / FactsStore
// =========================================================================

#[tokio::test]
async fn ad_upsert_refreshes_status_and_dates() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let mut incoming = new_ad(org, brand);
    incoming.first_seen_at = Some(ts("2024-01-02T00:00:00Z"));
    incoming.last_seen_at = Some(ts("2024-01-02T00:00:00Z"));
    let ad = ads.upsert_ad(incoming.clone()).await.unwrap();
    assert_eq!(ad.status, AdStatus::Active);

    // Re-crawl: status flips, last_seen advances, first_seen keeps the
    // earliest sighting.
    incoming.status = AdStatus::Inactive;
    incoming.first_seen_at = Some(ts("2024-01-05T00:00:00Z"));
    incoming.last_seen_at = Some(ts("2024-01-05T00:00:00Z"));
    incoming.raw_payload = json!({"body": "shop the sale", "refresh": 2});
    let refreshed = ads.upsert_ad(incoming).await.unwrap();

    assert_eq!(refreshed.id, ad.id);
    assert_eq!(refreshed.status, AdStatus::Inactive);
    assert_eq!(refreshed.first_seen_at, Some(ts("2024-01-02T00:00:00Z")));
    assert_eq!(refreshed.last_seen_at, Some(ts("2024-01-05T00:00:00Z")));
    assert_eq!(refreshed.raw_payload["refresh"], 2);
}

#[tokio::test]
async fn media_assets_replaced_wholesale() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let ad = ads.upsert_ad(new_ad(org, brand)).await.unwrap();

    let two = vec![
        NewMediaAsset {
            media_type: MediaType::Video,
            duration_ms: Some(45_500),
            source_url: Some("https://cdn.example.com/v.mp4".to_string()),
            metadata: json!({}),
        },
        NewMediaAsset {
            media_type: MediaType::Image,
            duration_ms: None,
            source_url: Some("https://cdn.example.com/i.jpg".to_string()),
            metadata: json!({}),
        },
    ];
    ads.replace_media_assets(ad.id, &two).await.unwrap();
    assert_eq!(ads.media_for_ad(ad.id).await.unwrap().len(), 2);

    let one = vec![NewMediaAsset {
        media_type: MediaType::Image,
        duration_ms: None,
        source_url: Some("https://cdn.example.com/i2.jpg".to_string()),
        metadata: json!({}),
    }];
    let replaced = ads.replace_media_assets(ad.id, &one).await.unwrap();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].position, 0);

    let listed = ads.media_for_ad(ad.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].media_type, MediaType::Image);
}

#[tokio::test]
async fn derived_facts_roundtrip_and_replace() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let facts_store = FactsStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let mut incoming = new_ad(org, brand);
    incoming.raw_payload = json!({"body": "shop", "languages": ["en_US"], "country": "US"});
    incoming.started_running_at = Some(ts("2024-01-01T00:00:00Z"));
    incoming.ended_running_at = Some(ts("2024-01-05T00:00:00Z"));
    let ad = ads.upsert_ad(incoming).await.unwrap();

    let assets = ads
        .replace_media_assets(
            ad.id,
            &[NewMediaAsset {
                media_type: MediaType::Video,
                duration_ms: Some(45_500),
                source_url: None,
                metadata: json!({}),
            }],
        )
        .await
        .unwrap();

    // Fixed timestamp so the row round-trips exactly through TIMESTAMPTZ.
    let derived = derive_ad_facts(&ad, &assets, ts("2024-05-01T00:00:00Z"));
    facts_store.upsert_facts(&derived).await.unwrap();
    assert_eq!(facts_store.get_facts(ad.id).await.unwrap().unwrap(), derived);

    // Re-derivation fully replaces the row.
    let rederived = derive_ad_facts(&ad, &[], ts("2024-05-02T00:00:00Z"));
    facts_store.upsert_facts(&rederived).await.unwrap();
    let stored = facts_store.get_facts(ad.id).await.unwrap().unwrap();
    assert_eq!(stored, rederived);
    assert_eq!(stored.display_format, None);
}

// =========================================================================
// TeardownStore — upsert and canonical swap
// =========================================================================

#[tokio::test]
async fn teardown_upsert_roundtrip() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-teardown").await;

    let (e1, e2, e3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let bundle = store
        .upsert(
            TeardownUpsert::new(org, creative.id)
                .with_summary("Founder-led UGC with a strong efficacy claim")
                .with_funnel_stage("Awareness")
                .with_evidence(vec![transcript(e1), numeric_claim(e2), proof(e3)])
                .with_assertions(vec![
                    AssertionInput::new("why_it_wins", "Founder credibility carries the hook")
                        .with_confidence(0.8)
                        .with_evidence_refs(vec![e1, e3]),
                    AssertionInput::new("predicted_audience", "Skincare-curious 25-34"),
                ]),
        )
        .await
        .unwrap();

    assert!(bundle.teardown.is_canonical);
    assert_eq!(bundle.teardown.funnel_stage.as_deref(), Some("awareness"));
    assert_eq!(bundle.evidence_items.len(), 3);
    assert_eq!(bundle.assertions.len(), 2);
    assert_eq!(bundle.evidence_items[0].id, e1);
    assert!(matches!(
        &bundle.evidence_items[1].body,
        EvidenceBody::NumericClaim { unit, .. } if unit == "percent"
    ));
    assert_eq!(bundle.assertions[0].evidence_refs, vec![e1, e3]);

    let canonical = store
        .canonical_for_creative(org, creative.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canonical.teardown.id, bundle.teardown.id);
}

#[tokio::test]
async fn second_canonical_upsert_demotes_prior() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-demote").await;

    let first = store
        .upsert(TeardownUpsert::new(org, creative.id).with_summary("first pass"))
        .await
        .unwrap();
    let second = store
        .upsert(TeardownUpsert::new(org, creative.id).with_summary("second pass"))
        .await
        .unwrap();
    assert_ne!(first.teardown.id, second.teardown.id);

    let demoted = store.get(org, first.teardown.id).await.unwrap().unwrap();
    assert!(!demoted.teardown.is_canonical);
    assert!(second.teardown.is_canonical);

    let (canonical_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM teardowns WHERE org_id = $1 AND creative_id = $2 AND is_canonical",
    )
    .bind(org)
    .bind(creative.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(canonical_count, 1);
}

#[tokio::test]
async fn concurrent_canonical_upserts_leave_one_canonical() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-canonical-race").await;

    let (left, right) = tokio::join!(
        store.upsert(TeardownUpsert::new(org, creative.id).with_summary("worker a")),
        store.upsert(TeardownUpsert::new(org, creative.id).with_summary("worker b")),
    );
    left.unwrap();
    right.unwrap();

    let (canonical_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM teardowns WHERE org_id = $1 AND creative_id = $2 AND is_canonical",
    )
    .bind(org)
    .bind(creative.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(canonical_count, 1);
}

#[tokio::test]
async fn update_in_place_keeps_id_and_replaces_children() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-update").await;

    let e1 = Uuid::new_v4();
    let first = store
        .upsert(TeardownUpsert::new(org, creative.id).with_evidence(vec![transcript(e1)]))
        .await
        .unwrap();

    let e2 = Uuid::new_v4();
    let updated = store
        .upsert(
            TeardownUpsert::new(org, creative.id)
                .with_id(first.teardown.id)
                .with_summary("revised")
                .with_evidence(vec![numeric_claim(e2)]),
        )
        .await
        .unwrap();

    assert_eq!(updated.teardown.id, first.teardown.id);
    assert_eq!(updated.teardown.summary.as_deref(), Some("revised"));
    assert_eq!(updated.evidence_items.len(), 1);
    assert_eq!(updated.evidence_items[0].id, e2);
}

// =========================================================================
// TeardownStore — validation
// =========================================================================

#[tokio::test]
async fn unknown_evidence_ref_rejected_before_write() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-badref").await;

    let missing = Uuid::new_v4();
    let err = store
        .upsert(
            TeardownUpsert::new(org, creative.id)
                .with_evidence(vec![transcript(Uuid::new_v4())])
                .with_assertions(vec![
                    AssertionInput::new("why_it_wins", "claim").with_evidence_refs(vec![missing])
                ]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownEvidenceRef { evidence_id, .. }
        if evidence_id == missing));

    // Nothing was written.
    assert!(store
        .canonical_for_creative(org, creative.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn duplicate_evidence_id_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-dup").await;

    let id = Uuid::new_v4();
    let err = store
        .upsert(
            TeardownUpsert::new(org, creative.id)
                .with_evidence(vec![transcript(id), numeric_claim(id)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEvidenceId(dup) if dup == id));
}

#[tokio::test]
async fn taxonomy_violation_carries_full_allowed_set() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-taxonomy").await;

    let bad = EvidenceItemInput::new(
        Uuid::new_v4(),
        EvidenceBody::TranscriptSegment {
            speaker_role: "host".to_string(),
            text: "welcome back".to_string(),
            start_seconds: None,
            end_seconds: None,
        },
    );
    let err = store
        .upsert(TeardownUpsert::new(org, creative.id).with_evidence(vec![bad]))
        .await
        .unwrap_err();
    let StoreError::Taxonomy(taxonomy_err) = err else {
        panic!("expected taxonomy error");
    };
    assert_eq!(taxonomy_err.value, "host");
    assert_eq!(taxonomy_err.allowed.len(), 5);
}

#[tokio::test]
async fn reusing_a_teardown_id_across_creatives_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let owner = seed_creative(&pool, org, brand, "fp-id-owner").await;
    let other = seed_creative(&pool, org, brand, "fp-id-other").await;

    let first = store
        .upsert(TeardownUpsert::new(org, owner.id))
        .await
        .unwrap();
    let err = store
        .upsert(TeardownUpsert::new(org, other.id).with_id(first.teardown.id))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TeardownIdConflict(id) if id == first.teardown.id));

    // The original row is untouched and still canonical for its creative.
    let kept = store.get(org, first.teardown.id).await.unwrap().unwrap();
    assert_eq!(kept.teardown.creative_id, owner.id);
    assert!(kept.teardown.is_canonical);
}

#[tokio::test]
async fn missing_creative_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let err = store
        .upsert(TeardownUpsert::new(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingCreative(_)));
}

// =========================================================================
// TeardownStore — reads and search
// =========================================================================

#[tokio::test]
async fn reads_are_org_scoped() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-scoped").await;

    let bundle = store
        .upsert(TeardownUpsert::new(org, creative.id))
        .await
        .unwrap();

    let other_org = Uuid::new_v4();
    assert!(store.get(other_org, bundle.teardown.id).await.unwrap().is_none());
    assert!(store
        .canonical_for_creative(other_org, creative.id)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .search(other_org, TeardownFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn canonical_for_ad_follows_membership() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let ads = AdStore::new(pool.clone());
    let index = CreativeIndex::new(pool.clone());
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());

    let ad = ads.upsert_ad(new_ad(org, brand)).await.unwrap();
    let creative = index
        .assign(
            &creative_key(org, brand, "fp-by-ad"),
            &SecondaryFingerprints::default(),
            ad.id,
        )
        .await
        .unwrap();
    let bundle = store
        .upsert(TeardownUpsert::new(org, creative.id).with_ad(ad.id))
        .await
        .unwrap();

    let by_ad = store.canonical_for_ad(org, ad.id).await.unwrap().unwrap();
    assert_eq!(by_ad.teardown.id, bundle.teardown.id);

    assert!(store
        .canonical_for_ad(org, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn search_filters_by_facet_and_linkage() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let with_proof = seed_creative(&pool, org, brand, "fp-search-a").await;
    let with_claim = seed_creative(&pool, org, brand, "fp-search-b").await;
    let client = Uuid::new_v4();

    let proof_bundle = store
        .upsert(
            TeardownUpsert::new(org, with_proof.id)
                .with_client(client)
                .with_evidence(vec![proof(Uuid::new_v4()), targeting(Uuid::new_v4())]),
        )
        .await
        .unwrap();
    let claim_bundle = store
        .upsert(
            TeardownUpsert::new(org, with_claim.id)
                .with_evidence(vec![numeric_claim(Uuid::new_v4())]),
        )
        .await
        .unwrap();

    let by_proof = store
        .search(
            org,
            TeardownFilter::default().with_facet(TeardownFacet::ProofType("testimonial".into())),
        )
        .await
        .unwrap();
    assert_eq!(by_proof.len(), 1);
    assert_eq!(by_proof[0].id, proof_bundle.teardown.id);

    let by_text = store
        .search(
            org,
            TeardownFilter::default()
                .with_facet(TeardownFacet::ClaimTextContains("97% saw".into())),
        )
        .await
        .unwrap();
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0].id, claim_bundle.teardown.id);

    let by_unit = store
        .search(
            org,
            TeardownFilter::default().with_facet(TeardownFacet::NumericUnit("percent".into())),
        )
        .await
        .unwrap();
    assert_eq!(by_unit.len(), 1);

    let by_category = store
        .search(
            org,
            TeardownFilter::default()
                .with_facet(TeardownFacet::SignalCategory("demographic".into())),
        )
        .await
        .unwrap();
    assert_eq!(by_category.len(), 1);
    assert_eq!(by_category[0].id, proof_bundle.teardown.id);

    let by_topic = store
        .search(
            org,
            TeardownFilter::default().with_facet(TeardownFacet::ClaimTopic("efficacy".into())),
        )
        .await
        .unwrap();
    assert_eq!(by_topic.len(), 1);
    assert_eq!(by_topic[0].id, claim_bundle.teardown.id);

    let by_client = store
        .search(org, TeardownFilter::default().with_client(client))
        .await
        .unwrap();
    assert_eq!(by_client.len(), 1);
    assert_eq!(by_client[0].id, proof_bundle.teardown.id);

    // Taxonomy-backed facets are validated before querying.
    let err = store
        .search(
            org,
            TeardownFilter::default().with_facet(TeardownFacet::BeatKey("cliffhanger".into())),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Taxonomy(_)));
}

#[tokio::test]
async fn search_excludes_non_canonical_by_default() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = TeardownStore::new(pool.clone());
    let (org, brand) = (Uuid::new_v4(), Uuid::new_v4());
    let creative = seed_creative(&pool, org, brand, "fp-non-canonical").await;

    store
        .upsert(TeardownUpsert::new(org, creative.id).non_canonical())
        .await
        .unwrap();

    assert!(store
        .search(org, TeardownFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .search(org, TeardownFilter::default().include_non_canonical())
            .await
            .unwrap()
            .len(),
        1
    );
}
