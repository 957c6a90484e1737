//! Bulk-import pipeline tests: status transitions, row validation, and
//! linkage of created records back to their staged rows.

mod helpers;

use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use helpers::*;
use individual_registry::database::ImportRepository;
use individual_registry::models::UploadStatus;
use individual_registry::services::ImportService;

#[tokio::test]
async fn test_partial_success_import() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let service = ImportService::new(db.pool.clone());
    let repository = ImportRepository::new(db.pool.clone());

    let upload = service
        .register_upload(&db.name("census"), "csv", "individual_import", "importer")
        .await?;
    assert_eq!(upload.status, UploadStatus::Pending);

    service
        .stage_individual_rows(
            upload.id,
            vec![
                json!({
                    "first_name": "Amina",
                    "last_name": db.prefix,
                    "dob": "1990-04-12",
                    "number_of_children": 2,
                }),
                json!({
                    "first_name": "Kofi",
                    "last_name": db.prefix,
                    "dob": "1978-11-02",
                }),
                // Missing dob: must fail validation, not the batch.
                json!({ "first_name": "Broken", "last_name": db.prefix }),
            ],
            "importer",
        )
        .await?;

    service.trigger(upload.id, "importer").await?;
    assert_eq!(
        repository.get_upload(upload.id).await?.unwrap().status,
        UploadStatus::Triggered
    );

    let outcome = service.run_import(upload.id, "importer").await?;
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.status, UploadStatus::PartialSuccess);

    let finished = repository.get_upload(upload.id).await?.unwrap();
    assert_eq!(finished.status, UploadStatus::PartialSuccess);
    assert_eq!(finished.error["created"], 2);
    assert_eq!(finished.error["failed"], 1);

    // Valid rows are linked to materialized individuals; the json payload
    // extras land in json_ext.
    let rows = repository.individual_rows(upload.id).await?;
    let linked: Vec<_> = rows.iter().filter(|r| r.individual_id.is_some()).collect();
    assert_eq!(linked.len(), 2);

    let amina_id: Uuid = linked[0].individual_id.unwrap();
    let json_ext: serde_json::Value = sqlx::query_scalar(
        r#"SELECT json_ext FROM registry.individuals WHERE id = $1"#,
    )
    .bind(amina_id)
    .fetch_one(&db.pool)
    .await?;
    assert_eq!(json_ext["number_of_children"], 2);

    let failed_row = rows
        .iter()
        .find(|r| r.individual_id.is_none())
        .expect("one row failed");
    assert_eq!(failed_row.validations["valid"], false);

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_all_rows_invalid_lands_on_fail() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let service = ImportService::new(db.pool.clone());
    let repository = ImportRepository::new(db.pool.clone());

    let upload = service
        .register_upload(&db.name("bad"), "csv", "individual_import", "importer")
        .await?;
    service
        .stage_individual_rows(
            upload.id,
            vec![json!({ "last_name": db.prefix }), json!("not an object")],
            "importer",
        )
        .await?;

    let outcome = service.run_import(upload.id, "importer").await?;
    assert_eq!(outcome.status, UploadStatus::Fail);
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.failed, 2);

    assert_eq!(
        repository.get_upload(upload.id).await?.unwrap().status,
        UploadStatus::Fail
    );

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_clean_import_lands_on_success() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let service = ImportService::new(db.pool.clone());

    let upload = service
        .register_upload(&db.name("clean"), "api", "individual_import", "importer")
        .await?;
    service
        .stage_individual_rows(
            upload.id,
            vec![json!({
                "first_name": "Clean",
                "last_name": db.prefix,
                "dob": "2001-01-01",
            })],
            "importer",
        )
        .await?;

    let outcome = service.run_import(upload.id, "importer").await?;
    assert_eq!(outcome.status, UploadStatus::Success);
    assert_eq!(outcome.created, 1);

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_group_import_links_created_groups() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let service = ImportService::new(db.pool.clone());
    let repository = ImportRepository::new(db.pool.clone());

    let upload = service
        .register_upload(&db.name("groups"), "csv", "group_import", "importer")
        .await?;
    service
        .stage_group_rows(
            upload.id,
            vec![
                json!({ "code": db.name("G1") }),
                json!({ "code": db.name("G2") }),
                json!({ "code": "" }),
            ],
            "importer",
        )
        .await?;

    let outcome = service.run_group_import(upload.id, "importer").await?;
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.status, UploadStatus::PartialSuccess);

    let rows = repository.group_rows(upload.id).await?;
    assert_eq!(rows.iter().filter(|r| r.group_id.is_some()).count(), 2);

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_trigger_rejected_after_terminal_status() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let service = ImportService::new(db.pool.clone());

    let upload = service
        .register_upload(&db.name("done"), "csv", "individual_import", "importer")
        .await?;
    service.run_import(upload.id, "importer").await?;

    let again = service.trigger(upload.id, "importer").await;
    assert!(matches!(
        again,
        Err(individual_registry::RegistryError::Validation(_))
    ));

    db.cleanup().await?;
    Ok(())
}
