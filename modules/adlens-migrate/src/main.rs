//! Runs pending SQLx migrations against the database.
//!
//! Migrations are embedded at compile time, so no migration files are needed
//! at runtime. Used as a deploy step before starting any ingestion workers.

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adlens-migrate", about = "Apply adlens database migrations")]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await
        .context("connecting to database")?;

    tracing::info!("Running database migrations");
    adlens_store::migrate(&pool)
        .await
        .context("applying migrations")?;
    tracing::info!("Migrations completed");

    Ok(())
}
