//! Data-import repository: upload batches, staged rows, and their linkage
//! back to materialized individuals and groups

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{
    GroupDataSource, IndividualDataSource, IndividualDataSourceUpload, IndividualDataUploadRecord,
    UploadStatus,
};

#[derive(Clone)]
pub struct ImportRepository {
    pool: PgPool,
}

impl ImportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create_upload(
        &self,
        source_name: &str,
        source_type: &str,
        username: &str,
    ) -> Result<IndividualDataSourceUpload> {
        let row = sqlx::query(
            r#"
            INSERT INTO registry.individual_data_source_uploads (
                source_name, source_type, user_created, user_updated
            ) VALUES ($1, $2, $3, $3)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, source_name, source_type,
                      status, error
            "#,
        )
        .bind(source_name)
        .bind(source_type)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        let upload = map_upload(row)?;
        info!("Registered upload: {} ({})", upload.source_name, upload.id);
        Ok(upload)
    }

    pub async fn get_upload(&self, id: Uuid) -> Result<Option<IndividualDataSourceUpload>> {
        let row = sqlx::query(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, source_name, source_type,
                   status, error
            FROM registry.individual_data_source_uploads
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_upload).transpose()
    }

    pub async fn set_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        error: Option<serde_json::Value>,
        username: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE registry.individual_data_source_uploads
            SET status = $2, error = COALESCE($3, error),
                version = version + 1, date_updated = NOW(), user_updated = $4
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(username)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound {
                entity: "IndividualDataSourceUpload",
                id,
            });
        }
        Ok(())
    }

    pub async fn create_upload_record(
        &self,
        data_upload_id: Uuid,
        workflow: &str,
        username: &str,
    ) -> Result<IndividualDataUploadRecord> {
        let record = sqlx::query_as::<_, IndividualDataUploadRecord>(
            r#"
            INSERT INTO registry.individual_data_upload_records (
                data_upload_id, workflow, user_created, user_updated
            ) VALUES ($1, $2, $3, $3)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, data_upload_id, workflow
            "#,
        )
        .bind(data_upload_id)
        .bind(workflow)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Stage one raw row of an individual upload
    pub async fn stage_individual_row(
        &self,
        upload_id: Uuid,
        payload: serde_json::Value,
        username: &str,
    ) -> Result<IndividualDataSource> {
        let row = sqlx::query_as::<_, IndividualDataSource>(
            r#"
            INSERT INTO registry.individual_data_sources (
                upload_id, json_ext, user_created, user_updated
            ) VALUES ($1, $2, $3, $3)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, individual_id, upload_id,
                      json_ext, validations
            "#,
        )
        .bind(upload_id)
        .bind(payload)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn stage_group_row(
        &self,
        upload_id: Uuid,
        payload: serde_json::Value,
        username: &str,
    ) -> Result<GroupDataSource> {
        let row = sqlx::query_as::<_, GroupDataSource>(
            r#"
            INSERT INTO registry.group_data_sources (
                upload_id, json_ext, user_created, user_updated
            ) VALUES ($1, $2, $3, $3)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, group_id, upload_id,
                      json_ext, validations
            "#,
        )
        .bind(upload_id)
        .bind(payload)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Staged rows of an upload, oldest first
    pub async fn individual_rows(&self, upload_id: Uuid) -> Result<Vec<IndividualDataSource>> {
        let rows = sqlx::query_as::<_, IndividualDataSource>(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, individual_id, upload_id,
                   json_ext, validations
            FROM registry.individual_data_sources
            WHERE upload_id = $1 AND NOT is_deleted
            ORDER BY date_created
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn group_rows(&self, upload_id: Uuid) -> Result<Vec<GroupDataSource>> {
        let rows = sqlx::query_as::<_, GroupDataSource>(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, group_id, upload_id,
                   json_ext, validations
            FROM registry.group_data_sources
            WHERE upload_id = $1 AND NOT is_deleted
            ORDER BY date_created
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Link a staged row to the individual it materialized into, recording
    /// the row's validation outcome. Runs inside the import transaction.
    pub async fn link_individual(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        data_source_id: Uuid,
        individual_id: Uuid,
        validations: serde_json::Value,
        username: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.individual_data_sources
            SET individual_id = $2, validations = $3,
                version = version + 1, date_updated = NOW(), user_updated = $4
            WHERE id = $1
            "#,
        )
        .bind(data_source_id)
        .bind(individual_id)
        .bind(validations)
        .bind(username)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Record a failed row's validation outcome without linkage
    pub async fn set_validations(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        data_source_id: Uuid,
        validations: serde_json::Value,
        username: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.individual_data_sources
            SET validations = $2,
                version = version + 1, date_updated = NOW(), user_updated = $3
            WHERE id = $1
            "#,
        )
        .bind(data_source_id)
        .bind(validations)
        .bind(username)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn link_group(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        data_source_id: Uuid,
        group_id: Uuid,
        validations: serde_json::Value,
        username: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.group_data_sources
            SET group_id = $2, validations = $3,
                version = version + 1, date_updated = NOW(), user_updated = $4
            WHERE id = $1
            "#,
        )
        .bind(data_source_id)
        .bind(group_id)
        .bind(validations)
        .bind(username)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn map_upload(row: PgRow) -> Result<IndividualDataSourceUpload> {
    let status: UploadStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))?;

    Ok(IndividualDataSourceUpload {
        id: row.get("id"),
        version: row.get("version"),
        is_deleted: row.get("is_deleted"),
        date_created: row.get("date_created"),
        date_updated: row.get("date_updated"),
        user_created: row.get("user_created"),
        user_updated: row.get("user_updated"),
        source_name: row.get("source_name"),
        source_type: row.get("source_type"),
        status,
        error: row.get("error"),
    })
}
