//! Bulk-import pipeline for individual and group records
//!
//! An upload moves PENDING -> TRIGGERED -> IN_PROGRESS and lands on
//! SUCCESS, PARTIAL_SUCCESS, or FAIL. Each staged row is validated,
//! materialized into an Individual (or Group) inside one transaction, and
//! linked back to its data-source row; per-row validation failures are
//! recorded on the row and aggregated into the upload's error payload.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::ImportRepository;
use crate::error::{RegistryError, Result, ValidationError};
use crate::models::{IndividualDataSourceUpload, UploadStatus};

/// Result of processing one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub created: usize,
    pub failed: usize,
    pub status: UploadStatus,
}

#[derive(Clone)]
pub struct ImportService {
    pool: PgPool,
    repository: ImportRepository,
}

impl ImportService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ImportRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create an upload batch plus its workflow audit record.
    pub async fn register_upload(
        &self,
        source_name: &str,
        source_type: &str,
        workflow: &str,
        username: &str,
    ) -> Result<IndividualDataSourceUpload> {
        let upload = self
            .repository
            .create_upload(source_name, source_type, username)
            .await?;
        self.repository
            .create_upload_record(upload.id, workflow, username)
            .await?;
        Ok(upload)
    }

    /// Stage raw individual rows under an upload.
    pub async fn stage_individual_rows(
        &self,
        upload_id: Uuid,
        rows: Vec<Value>,
        username: &str,
    ) -> Result<usize> {
        let count = rows.len();
        for payload in rows {
            self.repository
                .stage_individual_row(upload_id, payload, username)
                .await?;
        }
        info!("Staged {} row(s) for upload {}", count, upload_id);
        Ok(count)
    }

    pub async fn stage_group_rows(
        &self,
        upload_id: Uuid,
        rows: Vec<Value>,
        username: &str,
    ) -> Result<usize> {
        let count = rows.len();
        for payload in rows {
            self.repository
                .stage_group_row(upload_id, payload, username)
                .await?;
        }
        Ok(count)
    }

    /// Mark a pending upload as triggered for processing.
    pub async fn trigger(&self, upload_id: Uuid, username: &str) -> Result<()> {
        let upload = self.get_upload(upload_id).await?;
        if upload.status.is_terminal() {
            return Err(RegistryError::Validation(ValidationError::InvalidState {
                entity: "IndividualDataSourceUpload",
                id: upload_id,
                reason: format!("already finished as {}", upload.status),
            }));
        }
        self.repository
            .set_upload_status(upload_id, UploadStatus::Triggered, None, username)
            .await
    }

    /// Process every staged individual row of an upload.
    ///
    /// Row materialization and linkage run in one transaction; the upload's
    /// terminal status is written after the batch lands so a crash leaves
    /// the upload IN_PROGRESS rather than falsely terminal.
    pub async fn run_import(&self, upload_id: Uuid, username: &str) -> Result<ImportOutcome> {
        self.get_upload(upload_id).await?;
        self.repository
            .set_upload_status(upload_id, UploadStatus::InProgress, None, username)
            .await?;

        let rows = self.repository.individual_rows(upload_id).await?;
        let mut created = 0usize;
        let mut errors = Vec::new();

        let batch = async {
            let mut tx = self.pool.begin().await?;
            for row in &rows {
                match extract_individual(&row.json_ext) {
                    Ok(fields) => {
                        let individual_id: Uuid = sqlx::query_scalar(
                            r#"
                            INSERT INTO registry.individuals (
                                first_name, last_name, dob, json_ext, user_created, user_updated
                            ) VALUES ($1, $2, $3, $4, $5, $5)
                            RETURNING id
                            "#,
                        )
                        .bind(&fields.first_name)
                        .bind(&fields.last_name)
                        .bind(fields.dob)
                        .bind(&fields.json_ext)
                        .bind(username)
                        .fetch_one(&mut *tx)
                        .await?;

                        self.repository
                            .link_individual(
                                &mut tx,
                                row.id,
                                individual_id,
                                json!({ "valid": true }),
                                username,
                            )
                            .await?;
                        created += 1;
                    }
                    Err(row_errors) => {
                        self.repository
                            .set_validations(
                                &mut tx,
                                row.id,
                                json!({ "valid": false, "errors": row_errors }),
                                username,
                            )
                            .await?;
                        errors.push(json!({ "row": row.id, "errors": row_errors }));
                    }
                }
            }
            tx.commit().await?;
            Ok::<(), RegistryError>(())
        }
        .await;

        if let Err(e) = batch {
            warn!("Import {} aborted: {}", upload_id, e);
            self.repository
                .set_upload_status(
                    upload_id,
                    UploadStatus::Fail,
                    Some(json!({ "error": e.to_string() })),
                    username,
                )
                .await?;
            return Err(e);
        }

        let failed = errors.len();
        let status = terminal_status(created, failed);
        let error_summary = json!({
            "created": created,
            "failed": failed,
            "errors": errors,
        });
        self.repository
            .set_upload_status(upload_id, status, Some(error_summary), username)
            .await?;

        info!(
            "Import {} finished: {} created, {} failed ({})",
            upload_id, created, failed, status
        );
        Ok(ImportOutcome {
            created,
            failed,
            status,
        })
    }

    /// Process every staged group row of an upload.
    pub async fn run_group_import(&self, upload_id: Uuid, username: &str) -> Result<ImportOutcome> {
        self.get_upload(upload_id).await?;
        self.repository
            .set_upload_status(upload_id, UploadStatus::InProgress, None, username)
            .await?;

        let rows = self.repository.group_rows(upload_id).await?;
        let mut created = 0usize;
        let mut errors = Vec::new();

        let mut tx = self.pool.begin().await?;
        for row in &rows {
            match row.json_ext.get("code").and_then(Value::as_str) {
                Some(code) if !code.trim().is_empty() => {
                    let group_id: Uuid = sqlx::query_scalar(
                        r#"
                        INSERT INTO registry.groups (code, user_created, user_updated)
                        VALUES ($1, $2, $2)
                        RETURNING id
                        "#,
                    )
                    .bind(code)
                    .bind(username)
                    .fetch_one(&mut *tx)
                    .await?;

                    self.repository
                        .link_group(&mut tx, row.id, group_id, json!({ "valid": true }), username)
                        .await?;
                    created += 1;
                }
                _ => {
                    errors.push(json!({ "row": row.id, "errors": ["code is required"] }));
                }
            }
        }
        tx.commit().await?;

        let failed = errors.len();
        let status = terminal_status(created, failed);
        self.repository
            .set_upload_status(
                upload_id,
                status,
                Some(json!({ "created": created, "failed": failed, "errors": errors })),
                username,
            )
            .await?;

        Ok(ImportOutcome {
            created,
            failed,
            status,
        })
    }

    async fn get_upload(&self, upload_id: Uuid) -> Result<IndividualDataSourceUpload> {
        self.repository
            .get_upload(upload_id)
            .await?
            .ok_or(RegistryError::NotFound {
                entity: "IndividualDataSourceUpload",
                id: upload_id,
            })
    }
}

fn terminal_status(created: usize, failed: usize) -> UploadStatus {
    match (created, failed) {
        (_, 0) => UploadStatus::Success,
        (0, _) => UploadStatus::Fail,
        _ => UploadStatus::PartialSuccess,
    }
}

#[derive(Debug)]
struct ExtractedIndividual {
    first_name: String,
    last_name: String,
    dob: NaiveDate,
    json_ext: Value,
}

/// Validate a staged row payload. `first_name`, `last_name`, and an ISO
/// `dob` are required; every other key is carried into the individual's
/// json extension.
fn extract_individual(payload: &Value) -> std::result::Result<ExtractedIndividual, Vec<String>> {
    let mut errors = Vec::new();

    let object = match payload.as_object() {
        Some(object) => object.clone(),
        None => return Err(vec!["row payload must be an object".to_string()]),
    };

    let first_name = required_string(&object, "first_name", &mut errors);
    let last_name = required_string(&object, "last_name", &mut errors);
    let dob = match object.get("dob").and_then(Value::as_str) {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push(format!("dob '{raw}' is not a valid date"));
                None
            }
        },
        None => {
            errors.push("dob is required".to_string());
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut json_ext = object;
    json_ext.remove("first_name");
    json_ext.remove("last_name");
    json_ext.remove("dob");

    Ok(ExtractedIndividual {
        first_name: first_name.expect("validated above"),
        last_name: last_name.expect("validated above"),
        dob: dob.expect("validated above"),
        json_ext: Value::Object(json_ext),
    })
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match object.get(key).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Some(value.to_string()),
        _ => {
            errors.push(format!("{key} is required"));
            None
        }
    }
}
