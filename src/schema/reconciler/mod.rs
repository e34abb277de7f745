
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::database::sqlite::queries::{DependentQueries, EntryPointQueries};
use crate::schema::signature::{CANONICAL_VERSION, ENTRY_POINT_NAME, Signature};
use crate::{RecallError, Result};

/// Serializes reconcile and uninstall runs within the process. The SQLite
/// write lock taken by `BEGIN IMMEDIATE` covers other processes.
static CATALOG_WRITER: Mutex<()> = Mutex::const_new(());

/// What a reconciliation run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Typed keys of the variants that were removed
    pub removed: Vec<String>,
    /// Dependents dropped along with the removed variants
    pub dropped_dependents: Vec<String>,
    /// Typed key of the canonical variant now installed
    pub installed: String,
    /// False when the catalog already held exactly the canonical variant
    pub changed: bool,
}

/// Collapses every installed variant of the entry point into the canonical one.
///
/// Runs out-of-band (deploy or upgrade time). Removals and the install happen
/// in one write transaction, so a failed run leaves the catalog untouched.
#[derive(Debug, Clone)]
pub struct SchemaReconciler {
    database: Database,
    canonical: Signature,
}

impl SchemaReconciler {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self {
            database,
            canonical: Signature::canonical(),
        }
    }

    #[inline]
    pub fn canonical(&self) -> &Signature {
        &self.canonical
    }

    /// Install the canonical variant, removing every other one first.
    ///
    /// Idempotent: a catalog already in canonical form is left as is and the
    /// report has `changed == false`. After commit the catalog must hold
    /// exactly one variant; anything else is [`RecallError::InconsistentSchema`].
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _writer = CATALOG_WRITER.lock().await;
        info!("Reconciling entry point {}", ENTRY_POINT_NAME);

        let mut transaction = self.begin_immediate().await?;
        let report = self.collapse_variants(&mut transaction).await?;
        commit(transaction).await?;

        for key in &report.removed {
            info!("Removed variant {}", key);
        }
        for dependent in &report.dropped_dependents {
            warn!("Dropped dependent {}; re-register it against the canonical form", dependent);
        }

        let current = self.verify().await?;
        if current != self.canonical {
            error!("Entry point was replaced by {} after reconciliation", current.key());
            return Err(RecallError::InconsistentSchema {
                variants: vec![current.key()],
            });
        }

        if report.changed {
            info!("Installed canonical variant {}", report.installed);
        } else {
            debug!("Entry point already canonical: {}", report.installed);
        }
        Ok(report)
    }

    /// Check that exactly one variant is installed and return it
    pub async fn verify(&self) -> Result<Signature> {
        let rows = EntryPointQueries::list_by_name(self.database.pool(), ENTRY_POINT_NAME).await?;
        if rows.len() != 1 {
            let variants: Vec<String> = rows.iter().map(|row| row.signature.clone()).collect();
            error!(
                "Entry point {} has {} installed variants",
                ENTRY_POINT_NAME,
                variants.len()
            );
            return Err(RecallError::InconsistentSchema { variants });
        }

        Signature::from_row(&rows[0])
    }

    /// Remove every variant and its dependents. Returns the removed keys.
    pub async fn uninstall(&self) -> Result<Vec<String>> {
        let _writer = CATALOG_WRITER.lock().await;

        let mut transaction = self.begin_immediate().await?;
        let removed = remove_all_variants(&mut transaction).await?;
        commit(transaction).await?;

        info!("Uninstalled {} variants of {}", removed.len(), ENTRY_POINT_NAME);
        Ok(removed)
    }

    async fn collapse_variants(&self, conn: &mut SqliteConnection) -> Result<ReconcileReport> {
        let installed = self.canonical.key();
        let rows = EntryPointQueries::list_by_name(&mut *conn, ENTRY_POINT_NAME).await?;

        let already_canonical = match rows.as_slice() {
            [only] => {
                only.signature == installed
                    && only.version == CANONICAL_VERSION
                    && Signature::from_row(only).is_ok_and(|s| s == self.canonical)
            }
            _ => false,
        };
        if already_canonical {
            return Ok(ReconcileReport {
                removed: Vec::new(),
                dropped_dependents: Vec::new(),
                installed,
                changed: false,
            });
        }

        let dependents = DependentQueries::list_for_name(&mut *conn, ENTRY_POINT_NAME).await?;
        let removed_count = EntryPointQueries::delete_by_name(&mut *conn, ENTRY_POINT_NAME).await?;
        debug!("Removed {} variants", removed_count);

        EntryPointQueries::insert(
            &mut *conn,
            &self.canonical.to_new_entry_point(CANONICAL_VERSION),
        )
        .await?;

        Ok(ReconcileReport {
            removed: rows.into_iter().map(|row| row.signature).collect(),
            dropped_dependents: dependents.into_iter().map(|d| d.name).collect(),
            installed,
            changed: true,
        })
    }

    /// Start a transaction holding the database write lock. Dropping it
    /// without commit, including when the caller's future is cancelled,
    /// rolls back and releases the lock.
    async fn begin_immediate(&self) -> Result<Transaction<'static, Sqlite>> {
        self.database
            .pool()
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| RecallError::Database(format!("Failed to begin transaction: {}", e)))
    }
}

async fn remove_all_variants(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let rows = EntryPointQueries::list_by_name(&mut *conn, ENTRY_POINT_NAME).await?;
    EntryPointQueries::delete_by_name(&mut *conn, ENTRY_POINT_NAME).await?;
    Ok(rows.into_iter().map(|row| row.signature).collect())
}

/// A failed commit leaves the transaction open; dropping it rolls back
async fn commit(transaction: Transaction<'static, Sqlite>) -> Result<()> {
    transaction
        .commit()
        .await
        .map_err(|e| RecallError::Database(format!("Failed to commit transaction: {}", e)))
}
