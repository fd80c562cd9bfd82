//! Member points ledger: approval of account-opening requests, referral
//! bonuses and their reversal.

mod api;
pub mod config;
mod error;
pub mod ledger;
mod responses;
pub mod store;
pub mod types;

use anyhow::Context;
use anyhow::Result;
pub use api::{AppState, init_router};
pub use ledger::{Ledger, LedgerError, Notifier, NotifyLevel, PointRules, TracingNotifier};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

/// Initializes the database pool.
pub async fn init_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    Ok(pool)
}

/// Applies pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    Ok(())
}
