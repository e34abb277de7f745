use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::database::sqlite::models::{DependentRow, EntryPointRow};
use crate::database::sqlite::queries::{DependentQueries, EntryPointQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

pub const CATALOG_FILE: &str = "catalog.db";
const MAX_CONNECTIONS: u32 = 10;
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite catalog holding installed entry point variants and their dependents
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open the catalog at `path`, creating and migrating it as needed.
    ///
    /// Writers wait up to [`BUSY_TIMEOUT`] for another process holding the
    /// write lock before failing.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open catalog at {}", path.as_ref().display()))?;

        let database = Self { pool };
        database.run_migrations().await?;
        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        debug!("Applying catalog migrations");
        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to migrate entry point catalog")?;
        Ok(())
    }

    /// Open `catalog.db` inside `base_dir`
    pub async fn initialize_from_config_dir(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create {}", base_dir.display()))?;
        Self::new(base_dir.join(CATALOG_FILE)).await
    }

    pub async fn list_entry_points(&self, name: &str) -> Result<Vec<EntryPointRow>> {
        EntryPointQueries::list_by_name(&self.pool, name).await
    }

    pub async fn list_dependents(&self, name: &str) -> Result<Vec<DependentRow>> {
        DependentQueries::list_for_name(&self.pool, name).await
    }

    /// Reclaim space left by removed variants and refresh planner statistics
    pub async fn optimize(&self) -> Result<()> {
        sqlx::raw_sql("VACUUM; ANALYZE;")
            .execute(&self.pool)
            .await
            .context("Failed to compact catalog")?;
        info!("Catalog compacted");
        Ok(())
    }
}
