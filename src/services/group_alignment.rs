//! Group alignment service
//!
//! Maintains the denormalized invariants on a group whenever a membership
//! edge is created, updated, or deleted: at most one non-retired HEAD, at
//! most one non-retired PRIMARY recipient, and a refreshed summary in the
//! group's json extension.
//!
//! Alignment is an explicit step rather than a hidden side effect of save:
//! the write paths here persist the membership change and then run
//! alignment inside the same transaction, so a caller observing a
//! successful save is guaranteed the invariants already hold.
//! [`GroupAlignmentService::align_after_save`] re-runs the same step on its
//! own; every operation is idempotent, so re-running alignment on an
//! already-consistent group changes no rows.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::group_repository::map_membership;
use crate::error::{RegistryError, Result};
use crate::models::{GroupIndividual, GroupRole, GroupSummary, RecipientType};

/// Data for creating a membership edge
#[derive(Debug, Clone)]
pub struct MembershipInput {
    pub group_id: Uuid,
    pub individual_id: Uuid,
    pub role: Option<GroupRole>,
    pub recipient_type: Option<RecipientType>,
    pub json_ext: Value,
}

#[derive(Clone)]
pub struct GroupAlignmentService {
    pool: PgPool,
}

impl GroupAlignmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add an individual to a group and realign the group within one
    /// transaction.
    pub async fn add_member(
        &self,
        input: MembershipInput,
        username: &str,
    ) -> Result<GroupIndividual> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO registry.group_individuals (
                group_id, individual_id, role, recipient_type, json_ext,
                user_created, user_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, group_id, individual_id,
                      role, recipient_type, json_ext
            "#,
        )
        .bind(input.group_id)
        .bind(input.individual_id)
        .bind(input.role.map(|r| r.as_str()))
        .bind(input.recipient_type.map(|r| r.as_str()))
        .bind(&input.json_ext)
        .bind(username)
        .fetch_one(&mut *tx)
        .await?;
        let membership = map_membership(row)?;

        self.align_in_tx(&mut tx, &membership, username).await?;
        tx.commit().await?;

        info!(
            "Added individual {} to group {} as {:?}",
            membership.individual_id, membership.group_id, membership.role
        );
        Ok(membership)
    }

    /// Change a membership's role and recipient type (optimistic version
    /// check) and realign the group within one transaction.
    pub async fn update_membership(
        &self,
        id: Uuid,
        expected_version: i32,
        role: Option<GroupRole>,
        recipient_type: Option<RecipientType>,
        username: &str,
    ) -> Result<GroupIndividual> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE registry.group_individuals
            SET role = $3, recipient_type = $4,
                version = version + 1, date_updated = NOW(), user_updated = $5
            WHERE id = $1 AND version = $2 AND NOT is_deleted
            RETURNING id, version, is_deleted, date_created, date_updated,
                      user_created, user_updated, group_id, individual_id,
                      role, recipient_type, json_ext
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(role.map(|r| r.as_str()))
        .bind(recipient_type.map(|r| r.as_str()))
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;

        let membership = match row {
            Some(row) => map_membership(row)?,
            None => {
                tx.rollback().await?;
                return Err(self.membership_update_failure(id, expected_version).await?);
            }
        };

        self.align_in_tx(&mut tx, &membership, username).await?;
        tx.commit().await?;
        Ok(membership)
    }

    /// Soft-delete a membership and re-derive the group summary within one
    /// transaction.
    pub async fn remove_member(&self, id: Uuid, username: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let group_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE registry.group_individuals
            SET is_deleted = TRUE, version = version + 1,
                date_updated = NOW(), user_updated = $2
            WHERE id = $1 AND NOT is_deleted
            RETURNING group_id
            "#,
        )
        .bind(id)
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(group_id) = group_id else {
            tx.rollback().await?;
            return Err(RegistryError::NotFound {
                entity: "GroupIndividual",
                id,
            });
        };

        self.update_group_summary(&mut tx, group_id, username).await?;
        tx.commit().await?;

        info!("Removed membership {} from group {}", id, group_id);
        Ok(())
    }

    /// Re-run alignment for an existing membership in its own transaction.
    /// A no-op when the group is already consistent.
    pub async fn align_after_save(&self, membership_id: Uuid, username: &str) -> Result<()> {
        let row = sqlx::query(
            r#"
            SELECT id, version, is_deleted, date_created, date_updated,
                   user_created, user_updated, group_id, individual_id,
                   role, recipient_type, json_ext
            FROM registry.group_individuals
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(RegistryError::NotFound {
                entity: "GroupIndividual",
                id: membership_id,
            });
        };
        let membership = map_membership(row)?;

        let mut tx = self.pool.begin().await?;
        self.align_in_tx(&mut tx, &membership, username).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn align_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        membership: &GroupIndividual,
        username: &str,
    ) -> Result<()> {
        self.handle_head_change(tx, membership.id, membership.role, membership.group_id, username)
            .await?;
        self.handle_primary_recipient_change(
            tx,
            membership.id,
            membership.recipient_type,
            membership.group_id,
            username,
        )
        .await?;
        self.assure_primary_recipient_in_group(
            tx,
            membership.group_id,
            membership.recipient_type,
            username,
        )
        .await?;
        self.update_group_summary(tx, membership.group_id, username)
            .await?;
        Ok(())
    }

    /// When the saved role is HEAD, retire every other non-deleted HEAD in
    /// the group; at most one HEAD survives.
    async fn handle_head_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        membership_id: Uuid,
        role: Option<GroupRole>,
        group_id: Uuid,
        username: &str,
    ) -> Result<()> {
        if role != Some(GroupRole::Head) {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE registry.group_individuals
            SET role = NULL, version = version + 1,
                date_updated = NOW(), user_updated = $3
            WHERE group_id = $1 AND role = 'HEAD' AND id <> $2 AND NOT is_deleted
            "#,
        )
        .bind(group_id)
        .bind(membership_id)
        .bind(username)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            info!(
                "Retired {} previous head(s) of group {}",
                result.rows_affected(),
                group_id
            );
        }
        Ok(())
    }

    /// When the saved recipient type is PRIMARY, demote every other
    /// non-deleted PRIMARY in the group to SECONDARY.
    async fn handle_primary_recipient_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        membership_id: Uuid,
        recipient_type: Option<RecipientType>,
        group_id: Uuid,
        username: &str,
    ) -> Result<()> {
        if recipient_type != Some(RecipientType::Primary) {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE registry.group_individuals
            SET recipient_type = 'SECONDARY', version = version + 1,
                date_updated = NOW(), user_updated = $3
            WHERE group_id = $1 AND recipient_type = 'PRIMARY'
              AND id <> $2 AND NOT is_deleted
            "#,
        )
        .bind(group_id)
        .bind(membership_id)
        .bind(username)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            info!(
                "Demoted {} previous primary recipient(s) of group {}",
                result.rows_affected(),
                group_id
            );
        }
        Ok(())
    }

    /// When a recipient type is being assigned and the group has no PRIMARY,
    /// promote the head, else the earliest-created active member. A group
    /// with no members is left alone.
    async fn assure_primary_recipient_in_group(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        group_id: Uuid,
        recipient_type: Option<RecipientType>,
        username: &str,
    ) -> Result<()> {
        if recipient_type.is_none() {
            return Ok(());
        }

        let primaries: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM registry.group_individuals
            WHERE group_id = $1 AND recipient_type = 'PRIMARY' AND NOT is_deleted
            "#,
        )
        .bind(group_id)
        .fetch_one(&mut **tx)
        .await?;

        if primaries > 0 {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE registry.group_individuals
            SET recipient_type = 'PRIMARY', version = version + 1,
                date_updated = NOW(), user_updated = $2
            WHERE id = (
                SELECT id FROM registry.group_individuals
                WHERE group_id = $1 AND NOT is_deleted
                ORDER BY (role = 'HEAD') DESC NULLS LAST, date_created, id
                LIMIT 1
            )
            "#,
        )
        .bind(group_id)
        .bind(username)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() > 0 {
            info!("Promoted fallback primary recipient in group {}", group_id);
        } else {
            debug!("Group {} has no members to promote", group_id);
        }
        Ok(())
    }

    /// Recompute the denormalized summary (head, primary recipient, member
    /// count) into the group's json extension. Only writes when the summary
    /// actually changed; a missing or deleted group is absorbed as a no-op.
    async fn update_group_summary(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        group_id: Uuid,
        username: &str,
    ) -> Result<()> {
        let row: (Option<String>, Option<String>, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT i.first_name || ' ' || i.last_name
                 FROM registry.group_individuals gi
                 JOIN registry.individuals i ON i.id = gi.individual_id
                 WHERE gi.group_id = $1 AND gi.role = 'HEAD' AND NOT gi.is_deleted
                 ORDER BY gi.date_updated DESC LIMIT 1),
                (SELECT i.first_name || ' ' || i.last_name
                 FROM registry.group_individuals gi
                 JOIN registry.individuals i ON i.id = gi.individual_id
                 WHERE gi.group_id = $1 AND gi.recipient_type = 'PRIMARY' AND NOT gi.is_deleted
                 ORDER BY gi.date_updated DESC LIMIT 1),
                (SELECT COUNT(*) FROM registry.group_individuals gi
                 WHERE gi.group_id = $1 AND NOT gi.is_deleted)
            "#,
        )
        .bind(group_id)
        .fetch_one(&mut **tx)
        .await?;

        let summary = GroupSummary {
            head: row.0,
            primary_recipient: row.1,
            members: row.2,
        };
        let summary_json = serde_json::to_value(&summary)?;

        let result = sqlx::query(
            r#"
            UPDATE registry.groups
            SET json_ext = json_ext || $2, version = version + 1,
                date_updated = NOW(), user_updated = $3
            WHERE id = $1 AND NOT is_deleted
              AND json_ext IS DISTINCT FROM json_ext || $2
            "#,
        )
        .bind(group_id)
        .bind(&summary_json)
        .bind(username)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            // Already consistent, or the group itself is gone. Summary data
            // is best-effort denormalization, not authoritative.
            warn_if_group_missing(tx, group_id).await;
        }
        Ok(())
    }

    async fn membership_update_failure(
        &self,
        id: Uuid,
        expected_version: i32,
    ) -> Result<RegistryError> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM registry.group_individuals
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if exists > 0 {
            Ok(RegistryError::Concurrency {
                entity: "GroupIndividual",
                id,
                expected: expected_version,
            })
        } else {
            Ok(RegistryError::NotFound {
                entity: "GroupIndividual",
                id,
            })
        }
    }
}

async fn warn_if_group_missing(tx: &mut Transaction<'_, Postgres>, group_id: Uuid) {
    let found: std::result::Result<i64, sqlx::Error> =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM registry.groups WHERE id = $1 AND NOT is_deleted"#)
            .bind(group_id)
            .fetch_one(&mut **tx)
            .await;
    if let Ok(0) = found {
        warn!("Skipping summary refresh for missing group {}", group_id);
    }
}
