//! Mutation log: structured outcomes clients poll by internal id

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{MutationLogEntry, MutationStatus};

#[derive(Clone)]
pub struct MutationLogRepository {
    pool: PgPool,
}

impl MutationLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a mutation as received. Outcomes land on this entry later.
    pub async fn create(&self, label: &str, client_mutation_id: &str) -> Result<MutationLogEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO registry.mutation_log (client_mutation_id, label)
            VALUES ($1, $2)
            RETURNING internal_id, client_mutation_id, label, status, error,
                      date_created, date_updated
            "#,
        )
        .bind(client_mutation_id)
        .bind(label)
        .fetch_one(&self.pool)
        .await?;

        map_entry(row)
    }

    pub async fn get(&self, internal_id: Uuid) -> Result<Option<MutationLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT internal_id, client_mutation_id, label, status, error,
                   date_created, date_updated
            FROM registry.mutation_log
            WHERE internal_id = $1
            "#,
        )
        .bind(internal_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_entry).transpose()
    }

    pub async fn mark_success(&self, internal_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.mutation_log
            SET status = 'SUCCESS', date_updated = NOW()
            WHERE internal_id = $1
            "#,
        )
        .bind(internal_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_error(&self, internal_id: Uuid, error: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.mutation_log
            SET status = 'ERROR', error = $2, date_updated = NOW()
            WHERE internal_id = $1
            "#,
        )
        .bind(internal_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn map_entry(row: PgRow) -> Result<MutationLogEntry> {
    let status: MutationStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))?;

    Ok(MutationLogEntry {
        internal_id: row.get("internal_id"),
        client_mutation_id: row.get("client_mutation_id"),
        label: row.get("label"),
        status,
        error: row.get("error"),
        date_created: row.get("date_created"),
        date_updated: row.get("date_updated"),
    })
}
