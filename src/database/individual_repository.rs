//! Individual repository: lifecycle operations for registered individuals
//!
//! Rows are history-tracked: updates carry an optimistic version check and
//! deletes only set the soft-delete flag.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{Individual, NewIndividual, UpdateIndividual};

use super::SqlBind;

#[derive(Clone)]
pub struct IndividualRepository {
    pool: PgPool,
}

impl IndividualRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create(&self, request: NewIndividual, username: &str) -> Result<Individual> {
        let individual = sqlx::query_as::<_, Individual>(
            r#"
            INSERT INTO registry.individuals (
                first_name, last_name, dob, json_ext, village_id, user_created, user_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, first_name, last_name, dob,
                      json_ext, village_id
            "#,
        )
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.dob)
        .bind(&request.json_ext)
        .bind(request.village_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Created individual: {} ({})",
            individual.display_name(),
            individual.id
        );
        Ok(individual)
    }

    /// Fetch a non-deleted individual by id
    pub async fn get(&self, id: Uuid) -> Result<Option<Individual>> {
        let individual = sqlx::query_as::<_, Individual>(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, first_name, last_name, dob,
                   json_ext, village_id
            FROM registry.individuals
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(individual)
    }

    /// Update with an optimistic version check. A stale `expected_version`
    /// fails with a Concurrency error and writes nothing.
    pub async fn update(
        &self,
        id: Uuid,
        expected_version: i32,
        request: UpdateIndividual,
        username: &str,
    ) -> Result<Individual> {
        let village_changed = request.village_id.is_some();
        let village_value = request.village_id.flatten();

        let updated = sqlx::query_as::<_, Individual>(
            r#"
            UPDATE registry.individuals
            SET first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                dob = COALESCE($5, dob),
                json_ext = COALESCE($6, json_ext),
                village_id = CASE WHEN $7 THEN $8 ELSE village_id END,
                version = version + 1,
                date_updated = NOW(),
                user_updated = $9
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, first_name, last_name, dob,
                      json_ext, village_id
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(request.first_name)
        .bind(request.last_name)
        .bind(request.dob)
        .bind(request.json_ext)
        .bind(village_changed)
        .bind(village_value)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(individual) => Ok(individual),
            None => match self.get(id).await? {
                Some(_) => Err(RegistryError::Concurrency {
                    entity: "Individual",
                    id,
                    expected: expected_version,
                }),
                None => Err(RegistryError::NotFound {
                    entity: "Individual",
                    id,
                }),
            },
        }
    }

    /// Soft delete; the row stays versioned in place.
    pub async fn soft_delete(&self, id: Uuid, username: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE registry.individuals
            SET is_deleted = TRUE, version = version + 1,
                date_updated = NOW(), user_updated = $2
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound {
                entity: "Individual",
                id,
            });
        }

        info!("Soft-deleted individual: {}", id);
        Ok(())
    }

    /// List non-deleted individuals matching a predicate on alias `i` whose
    /// bind placeholders start at `$1`. Used with the visibility filter.
    pub async fn list_where(
        &self,
        predicate: &str,
        binds: &[SqlBind],
    ) -> Result<Vec<Individual>> {
        let sql = format!(
            r#"
            SELECT i.id, i.version, i.is_deleted, i.date_created, i.date_updated,
                   i.user_created, i.user_updated, i.first_name, i.last_name,
                   i.dob, i.json_ext, i.village_id
            FROM registry.individuals i
            WHERE NOT i.is_deleted AND ({predicate})
            ORDER BY i.date_created
            "#
        );

        let mut query = sqlx::query_as::<_, Individual>(&sql);
        for bind in binds {
            query = match bind {
                SqlBind::Uuid(v) => query.bind(*v),
                SqlBind::UuidList(v) => query.bind(v.clone()),
                SqlBind::Int(v) => query.bind(*v),
                SqlBind::Bool(v) => query.bind(*v),
                SqlBind::Str(v) => query.bind(v.clone()),
                SqlBind::Date(v) => query.bind(*v),
            };
        }

        Ok(query.fetch_all(&self.pool).await?)
    }
}
