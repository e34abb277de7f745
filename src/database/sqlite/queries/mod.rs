
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Executor, Sqlite};
use tracing::debug;

/// Catalog queries. Each helper runs a single statement on any executor, so
/// they compose inside a caller-owned transaction as well as on the pool.
pub struct EntryPointQueries;

impl EntryPointQueries {
    #[inline]
    pub async fn list_by_name<'e, E>(executor: E, name: &str) -> Result<Vec<EntryPointRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, EntryPointRow>(
            r#"
            SELECT id, name, signature, parameters, version, installed_at
            FROM query_entry_points
            WHERE name = ?
            ORDER BY id
            "#,
        )
        .bind(name)
        .fetch_all(executor)
        .await
        .context("Failed to list entry point variants")
    }

    /// Insert a variant. Fails if the same name and signature is already installed.
    #[inline]
    pub async fn insert<'e, E>(executor: E, entry_point: &NewEntryPoint) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let parameters = serde_json::to_string(&entry_point.parameters)
            .context("Failed to serialize entry point parameters")?;
        let now = Utc::now().naive_utc();

        let id = sqlx::query(
            r#"
            INSERT INTO query_entry_points (name, signature, parameters, version, installed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry_point.name)
        .bind(&entry_point.signature)
        .bind(parameters)
        .bind(entry_point.version)
        .bind(now)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to install entry point {}", entry_point.signature))?
        .last_insert_rowid();

        debug!("Installed entry point {} as id {}", entry_point.signature, id);
        Ok(id)
    }

    /// Delete every variant of `name`; their dependents cascade.
    /// Returns the number of variants removed.
    #[inline]
    pub async fn delete_by_name<'e, E>(executor: E, name: &str) -> Result<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM query_entry_points WHERE name = ?")
            .bind(name)
            .execute(executor)
            .await
            .with_context(|| format!("Failed to remove variants of {}", name))?;

        Ok(result.rows_affected())
    }

}

pub struct DependentQueries;

impl DependentQueries {
    #[inline]
    pub async fn register<'e, E>(executor: E, entry_point_id: i64, name: &str) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            r#"
            INSERT INTO entry_point_dependents (entry_point_id, name, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(entry_point_id)
        .bind(name)
        .bind(now)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to register dependent {}", name))?
        .last_insert_rowid();

        Ok(id)
    }

    /// Dependents of every variant named `name`, in variant then registration order
    #[inline]
    pub async fn list_for_name<'e, E>(executor: E, name: &str) -> Result<Vec<DependentRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DependentRow>(
            r#"
            SELECT d.id, d.entry_point_id, d.name, d.created_at
            FROM entry_point_dependents d
            JOIN query_entry_points e ON e.id = d.entry_point_id
            WHERE e.name = ?
            ORDER BY d.entry_point_id, d.id
            "#,
        )
        .bind(name)
        .fetch_all(executor)
        .await
        .context("Failed to list dependents")
    }
}
