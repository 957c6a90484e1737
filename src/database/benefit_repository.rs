//! Benefit-plan and beneficiary access
//!
//! Both tables are owned by the benefit-plan subsystem; the enrollment
//! engine reads plan capacity and writes beneficiary rows through here.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{BeneficiaryStatus, BenefitPlan};

#[derive(Clone)]
pub struct BenefitRepository {
    pool: PgPool,
}

impl BenefitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<Option<BenefitPlan>> {
        let plan = sqlx::query_as::<_, BenefitPlan>(
            r#"
            SELECT id, is_deleted, date_created, code, name, plan_type, max_beneficiaries
            FROM registry.benefit_plans
            WHERE id = $1 AND NOT is_deleted
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    /// Fetch a plan and take a row lock on it. Concurrent confirmations of
    /// the same plan serialize on this lock, which makes the capacity check
    /// and the batch write observe a consistent snapshot.
    pub async fn get_plan_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<BenefitPlan> {
        let plan = sqlx::query_as::<_, BenefitPlan>(
            r#"
            SELECT id, is_deleted, date_created, code, name, plan_type, max_beneficiaries
            FROM registry.benefit_plans
            WHERE id = $1 AND NOT is_deleted
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        plan.ok_or(RegistryError::NotFound {
            entity: "BenefitPlan",
            id,
        })
    }

    /// Enroll one individual within the caller's transaction. A soft-deleted
    /// beneficiary row for the same (individual, plan) pair is reactivated
    /// at the requested status instead of inserting a duplicate; a live row
    /// is left untouched.
    pub async fn enroll(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        individual_id: Uuid,
        benefit_plan_id: Uuid,
        status: BeneficiaryStatus,
        username: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registry.beneficiaries (
                individual_id, benefit_plan_id, status, user_created, user_updated
            ) VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (individual_id, benefit_plan_id) DO UPDATE
                SET status = EXCLUDED.status,
                    is_deleted = FALSE,
                    version = registry.beneficiaries.version + 1,
                    date_updated = NOW(),
                    user_updated = EXCLUDED.user_updated
                WHERE registry.beneficiaries.is_deleted
            "#,
        )
        .bind(individual_id)
        .bind(benefit_plan_id)
        .bind(status.as_str())
        .bind(username)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Count non-deleted beneficiaries of a plan at a status, unscoped by
    /// visibility. Used by tests and post-enrollment verification.
    pub async fn count_plan_status(
        &self,
        benefit_plan_id: Uuid,
        status: BeneficiaryStatus,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM registry.beneficiaries
            WHERE benefit_plan_id = $1 AND status = $2 AND NOT is_deleted
            "#,
        )
        .bind(benefit_plan_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
