//! Record repair commands.
//!
//! The server repairs a record whenever it is read. These commands do the
//! same for records nobody is reading, so legacy fields can be retired.
//!
//! # Usage
//!
//! ```bash
//! # Repair one user and print the canonical state
//! sp-cli repair 42
//!
//! # Report drift without writing
//! sp-cli repair-all --dry-run
//!
//! # Repair every stored record
//! sp-cli repair-all
//! ```
//!
//! # Environment Variables
//!
//! - `STUDYPASS_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `STUDYPASS_CATALOG_PATH` - JSON file listing the module catalog in order

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use studypass_core::UserId;
use studypass_server::catalog::{CatalogError, load_catalog};
use studypass_server::db::{DocumentStore, PgDocumentStore, RepositoryError, create_pool};
use studypass_server::services::{EngineError, StateRepairLoader};

use super::migrate::database_url;

/// Errors that can occur during repair.
#[derive(Debug, Error)]
pub enum RepairError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Could not render state: {0}")]
    Render(#[from] serde_json::Error),
}

/// Totals from a bulk repair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairSummary {
    pub scanned: usize,
    pub drifted: usize,
    pub failed: usize,
}

/// Build a loader over the configured `PostgreSQL` store and catalog.
async fn connect() -> Result<(Arc<dyn DocumentStore>, StateRepairLoader), RepairError> {
    dotenvy::dotenv().ok();

    let database_url =
        database_url().ok_or(RepairError::MissingEnvVar("STUDYPASS_DATABASE_URL"))?;
    let catalog_path = std::env::var("STUDYPASS_CATALOG_PATH")
        .map(PathBuf::from)
        .map_err(|_| RepairError::MissingEnvVar("STUDYPASS_CATALOG_PATH"))?;

    let catalog = load_catalog(&catalog_path).await?;
    tracing::info!(modules = catalog.len(), "Catalog loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
    let loader = StateRepairLoader::new(store.clone(), Arc::new(catalog));

    Ok((store, loader))
}

/// Repair one user and print the canonical state as JSON.
///
/// # Errors
///
/// Returns `RepairError` if setup fails or the record cannot be read or written.
pub async fn one(user_id: i32) -> Result<(), RepairError> {
    let (_, loader) = connect().await?;

    let state = loader.load(UserId::new(user_id), Utc::now()).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    Ok(())
}

/// Repair every stored record, or only report drift with `dry_run`.
///
/// A failure on one record is logged and counted; the scan continues.
///
/// # Errors
///
/// Returns `RepairError` if setup fails or the user list cannot be read.
pub async fn all(dry_run: bool) -> Result<RepairSummary, RepairError> {
    let (store, loader) = connect().await?;

    let user_ids = store.list_user_ids().await?;
    tracing::info!(users = user_ids.len(), dry_run, "Scanning user records");

    let mut summary = RepairSummary::default();
    for user_id in user_ids {
        summary.scanned += 1;
        let now = Utc::now();

        let drifted = if dry_run {
            loader.inspect(user_id, now).await.map(|repair| {
                if repair.needs_write() {
                    tracing::info!(
                        user_id = %user_id,
                        set = ?repair.patch.fields().keys().collect::<Vec<_>>(),
                        removed = ?repair.patch.removed(),
                        "Record has drifted"
                    );
                }
                repair.needs_write()
            })
        } else {
            // `load` logs and writes the fix itself.
            match loader.inspect(user_id, now).await {
                Ok(repair) if repair.needs_write() => loader.load(user_id, now).await.map(|_| true),
                Ok(_) => Ok(false),
                Err(e) => Err(e),
            }
        };

        match drifted {
            Ok(true) => summary.drifted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Repair failed");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        scanned = summary.scanned,
        drifted = summary.drifted,
        failed = summary.failed,
        dry_run,
        "Repair complete"
    );

    Ok(summary)
}
