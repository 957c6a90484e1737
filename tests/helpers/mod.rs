//! Shared test infrastructure
//!
//! Tests run against the database from `TEST_DATABASE_URL` (falling back to
//! `DATABASE_URL`). When no database is reachable the caller skips the
//! test, so the suite stays green on machines without Postgres. Every
//! fixture row carries the per-run prefix so parallel runs do not collide
//! and cleanup stays scoped.

#![allow(dead_code)]

use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use individual_registry::models::{BeneficiaryStatus, Individual};

const SCHEMA_SQL: &str = include_str!("../../migrations/schema.sql");

pub struct TestDb {
    pub pool: PgPool,
    pub prefix: String,
}

impl TestDb {
    /// Connect and bootstrap the schema. Returns `None` when the database
    /// is unreachable so callers can skip.
    pub async fn connect() -> Result<Option<Self>> {
        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgresql://localhost:5432/registry".into());

        let pool = match PgPool::connect(&url).await {
            Ok(pool) => pool,
            Err(e) => {
                eprintln!("skipping: database unavailable ({e})");
                return Ok(None);
            }
        };

        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;

        let prefix = format!("t{}", &Uuid::new_v4().simple().to_string()[..8]);
        Ok(Some(Self { pool, prefix }))
    }

    pub fn name(&self, base: &str) -> String {
        format!("{}_{}", self.prefix, base)
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pattern = format!("{}%", self.prefix);

        sqlx::query(
            r#"DELETE FROM registry.beneficiaries WHERE individual_id IN
               (SELECT id FROM registry.individuals WHERE last_name LIKE $1)
               OR benefit_plan_id IN
               (SELECT id FROM registry.benefit_plans WHERE code LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.enrollment_approvals WHERE benefit_plan_id IN
               (SELECT id FROM registry.benefit_plans WHERE code LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.group_individuals WHERE group_id IN
               (SELECT id FROM registry.groups WHERE code LIKE $1)
               OR individual_id IN
               (SELECT id FROM registry.individuals WHERE last_name LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.individual_data_sources WHERE upload_id IN
               (SELECT id FROM registry.individual_data_source_uploads WHERE source_name LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.group_data_sources WHERE upload_id IN
               (SELECT id FROM registry.individual_data_source_uploads WHERE source_name LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.individual_data_upload_records WHERE data_upload_id IN
               (SELECT id FROM registry.individual_data_source_uploads WHERE source_name LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(
            r#"DELETE FROM registry.individual_data_source_uploads WHERE source_name LIKE $1"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();

        sqlx::query(r#"DELETE FROM registry.individuals WHERE last_name LIKE $1"#)
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(r#"DELETE FROM registry.groups WHERE code LIKE $1"#)
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();

        sqlx::query(r#"DELETE FROM registry.benefit_plans WHERE code LIKE $1"#)
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();

        for loc_type in ["V", "W", "D"] {
            sqlx::query(
                r#"DELETE FROM registry.locations WHERE name LIKE $1 AND loc_type = $2"#,
            )
            .bind(&pattern)
            .bind(loc_type)
            .execute(&self.pool)
            .await
            .ok();
        }

        Ok(())
    }
}

/// A district with one ward and one village under it
pub struct LocationChain {
    pub district_id: Uuid,
    pub ward_id: Uuid,
    pub village_id: Uuid,
}

pub async fn create_location_chain(db: &TestDb, label: &str) -> Result<LocationChain> {
    let district_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO registry.locations (name, loc_type) VALUES ($1, 'D') RETURNING location_id"#,
    )
    .bind(db.name(&format!("{label}_district")))
    .fetch_one(&db.pool)
    .await?;

    let ward_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO registry.locations (name, loc_type, parent_id)
           VALUES ($1, 'W', $2) RETURNING location_id"#,
    )
    .bind(db.name(&format!("{label}_ward")))
    .bind(district_id)
    .fetch_one(&db.pool)
    .await?;

    let village_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO registry.locations (name, loc_type, parent_id)
           VALUES ($1, 'V', $2) RETURNING location_id"#,
    )
    .bind(db.name(&format!("{label}_village")))
    .bind(ward_id)
    .fetch_one(&db.pool)
    .await?;

    Ok(LocationChain {
        district_id,
        ward_id,
        village_id,
    })
}

/// Create an individual whose last name carries the run prefix
pub async fn create_individual(
    db: &TestDb,
    first_name: &str,
    json_ext: serde_json::Value,
    village_id: Option<Uuid>,
) -> Result<Individual> {
    let individual = sqlx::query_as::<_, Individual>(
        r#"INSERT INTO registry.individuals (
               first_name, last_name, dob, json_ext, village_id, user_created, user_updated
           ) VALUES ($1, $2, '1985-01-15', $3, $4, 'test', 'test')
           RETURNING id, version, is_deleted, date_created, date_updated,
                     user_created, user_updated, first_name, last_name, dob,
                     json_ext, village_id"#,
    )
    .bind(first_name)
    .bind(db.prefix.clone())
    .bind(json_ext)
    .bind(village_id)
    .fetch_one(&db.pool)
    .await?;
    Ok(individual)
}

pub async fn create_group(db: &TestDb, code: &str, village_id: Option<Uuid>) -> Result<Uuid> {
    let group_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO registry.groups (code, village_id, user_created, user_updated)
           VALUES ($1, $2, 'test', 'test') RETURNING id"#,
    )
    .bind(db.name(code))
    .bind(village_id)
    .fetch_one(&db.pool)
    .await?;
    Ok(group_id)
}

/// A group holding one individual, mirroring the canonical fixture
pub async fn create_group_with_individual(
    db: &TestDb,
    village_id: Option<Uuid>,
) -> Result<(Individual, Uuid)> {
    let individual = create_individual(db, "GroupedMember", json!({}), None).await?;
    let group_id = create_group(db, "GA", village_id).await?;
    sqlx::query(
        r#"INSERT INTO registry.group_individuals (
               group_id, individual_id, role, user_created, user_updated
           ) VALUES ($1, $2, 'HEAD', 'test', 'test')"#,
    )
    .bind(group_id)
    .bind(individual.id)
    .execute(&db.pool)
    .await?;
    Ok((individual, group_id))
}

/// Seed a benefit plan (owned by the external benefit-plan subsystem)
pub async fn create_benefit_plan(
    db: &TestDb,
    code: &str,
    max_beneficiaries: Option<i32>,
) -> Result<Uuid> {
    let plan_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO registry.benefit_plans (code, name, plan_type, max_beneficiaries)
           VALUES ($1, $1, 'INDIVIDUAL', $2) RETURNING id"#,
    )
    .bind(db.name(code))
    .bind(max_beneficiaries)
    .fetch_one(&db.pool)
    .await?;
    Ok(plan_id)
}

/// Seed an existing beneficiary record
pub async fn add_beneficiary(
    db: &TestDb,
    individual_id: Uuid,
    benefit_plan_id: Uuid,
    status: BeneficiaryStatus,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO registry.beneficiaries (
               individual_id, benefit_plan_id, status, user_created, user_updated
           ) VALUES ($1, $2, $3, 'test', 'test')"#,
    )
    .bind(individual_id)
    .bind(benefit_plan_id)
    .bind(status.as_str())
    .execute(&db.pool)
    .await?;
    Ok(())
}
