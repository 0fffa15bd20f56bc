use uuid::Uuid;

use adlens_common::TaxonomyError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    /// An ad's creative membership must never silently move to a different
    /// creative.
    #[error("ad {ad_id} already belongs to creative {existing}, refusing to repoint to {incoming}")]
    MembershipConflict {
        ad_id: Uuid,
        existing: Uuid,
        incoming: Uuid,
    },

    #[error("assertion #{assertion_index} references unknown evidence item {evidence_id}")]
    UnknownEvidenceRef {
        assertion_index: usize,
        evidence_id: Uuid,
    },

    #[error("duplicate evidence item id {0} in teardown payload")]
    DuplicateEvidenceId(Uuid),

    #[error("no creative {0} in this org")]
    MissingCreative(Uuid),

    /// A teardown id can only ever be reused against its own org and
    /// creative.
    #[error("teardown {0} belongs to a different org or creative")]
    TeardownIdConflict(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Postgres unique-constraint violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505")
    )
}
