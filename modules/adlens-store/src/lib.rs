//! Postgres persistence for the creative identity and teardown subsystem.
//!
//! All services here are plain synchronous-per-call stores, safely callable
//! from concurrent workers; the relational store is the only shared mutable
//! state. Every write is an idempotent upsert.

pub mod ads;
pub mod creatives;
pub mod error;
pub mod evidence;
pub mod teardowns;

pub use ads::{AdStore, FactsStore, NewAd, NewMediaAsset};
pub use creatives::{Creative, CreativeIndex, CreativeKey, SecondaryFingerprints};
pub use error::{Result, StoreError};
pub use evidence::{EvidenceBody, EvidenceItem, EvidenceItemInput};
pub use teardowns::{
    Assertion, AssertionInput, Teardown, TeardownBundle, TeardownFacet, TeardownFilter,
    TeardownStore, TeardownUpsert,
};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use adlens_common::Config;

/// Connect a pool from the env-driven config.
pub async fn connect(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(Into::into)
}

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.into()))?;
    Ok(())
}
