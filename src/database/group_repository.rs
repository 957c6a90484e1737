//! Group repository: household groups and their membership edges
//!
//! Membership writes go through the alignment service so the head and
//! primary-recipient invariants are re-derived in the same transaction;
//! this repository covers group lifecycle and read paths.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{Group, GroupIndividual};

use super::SqlBind;

#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create(
        &self,
        code: &str,
        village_id: Option<Uuid>,
        username: &str,
    ) -> Result<Group> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO registry.groups (code, village_id, user_created, user_updated)
            VALUES ($1, $2, $3, $3)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, code, json_ext, village_id
            "#,
        )
        .bind(code)
        .bind(village_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        info!("Created group: {} ({})", group.code, group.id);
        Ok(group)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, code, json_ext, village_id
            FROM registry.groups
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    pub async fn soft_delete(&self, id: Uuid, username: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE registry.groups
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
            return Err(RegistryError::NotFound { entity: "Group", id });
        }

        info!("Soft-deleted group: {}", id);
        Ok(())
    }

    /// Active membership edges of a group, oldest first
    pub async fn memberships(&self, group_id: Uuid) -> Result<Vec<GroupIndividual>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, group_id, individual_id,
                   role, recipient_type, json_ext
            FROM registry.group_individuals
            WHERE group_id = $1 AND NOT is_deleted
            ORDER BY date_created
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_membership).collect()
    }

    pub async fn get_membership(&self, id: Uuid) -> Result<Option<GroupIndividual>> {
        let row = sqlx::query(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, group_id, individual_id,
                   role, recipient_type, json_ext
            FROM registry.group_individuals
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_membership).transpose()
    }

    /// List non-deleted groups matching a predicate on alias `g` whose bind
    /// placeholders start at `$1`. Used with the visibility filter.
    pub async fn list_where(&self, predicate: &str, binds: &[SqlBind]) -> Result<Vec<Group>> {
        let sql = format!(
            r#"
            SELECT g.id, g.version, g.is_deleted, g.date_created, g.date_updated,
                   g.user_created, g.user_updated, g.code, g.json_ext, g.village_id
            FROM registry.groups g
            WHERE NOT g.is_deleted AND ({predicate})
            ORDER BY g.date_created
            "#
        );

        let mut query = sqlx::query_as::<_, Group>(&sql);
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

/// Map a membership row, parsing the stored role/recipient strings. A value
/// outside the enum means the row was written by something newer than this
/// build; surface it as a decode error rather than dropping the field.
pub(crate) fn map_membership(row: PgRow) -> Result<GroupIndividual> {
    let role = row
        .get::<Option<String>, _>("role")
        .map(|s| {
            s.parse()
                .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))
        })
        .transpose()?;
    let recipient_type = row
        .get::<Option<String>, _>("recipient_type")
        .map(|s| {
            s.parse()
                .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))
        })
        .transpose()?;

    Ok(GroupIndividual {
        id: row.get("id"),
        version: row.get("version"),
        is_deleted: row.get("is_deleted"),
        date_created: row.get("date_created"),
        date_updated: row.get("date_updated"),
        user_created: row.get("user_created"),
        user_updated: row.get("user_updated"),
        group_id: row.get("group_id"),
        individual_id: row.get("individual_id"),
        role,
        recipient_type,
        json_ext: row.get("json_ext"),
    })
}
