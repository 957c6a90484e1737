//! Enrollment summary and confirmation engine
//!
//! Computes aggregate counts of individuals against arbitrary filter sets
//! and benefit-plan membership, and performs bulk enrollment subject to the
//! plan's active-beneficiary capacity.
//!
//! Grouped-individual policy: individuals who belong to a group enroll as
//! part of their group, so `selected` and every field derived from it
//! exclude them. `total` deliberately does not, and neither does the
//! filter-independent plan population count; both report registry-wide
//! figures.

use serde_json::json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::database::{
    fetch_scalar_i64, fetch_uuids, BenefitRepository, MutationLogRepository, SqlBind,
};
use crate::error::{RegistryError, Result, ValidationError};
use crate::filters::{parse_custom_filters, FieldRegistry, FilterSet};
use crate::models::{
    ApprovalState, BeneficiaryStatus, BenefitPlan, EnrollmentApproval, EnrollmentSummary,
    MutationResult,
};
use crate::services::visibility::{UserContext, VisibilityFilter};

const MUTATION_LABEL: &str = "confirm_individual_enrollment";

/// Predicate excluding individuals that hold any active group membership
const NOT_IN_GROUP: &str = "NOT EXISTS (SELECT 1 FROM registry.group_individuals gi \
     WHERE gi.individual_id = i.id AND NOT gi.is_deleted)";

/// Predicate matching individuals with a beneficiary record in any plan
const IN_ANY_PLAN: &str = "EXISTS (SELECT 1 FROM registry.beneficiaries b \
     WHERE b.individual_id = i.id AND NOT b.is_deleted)";

fn in_plan(param: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM registry.beneficiaries b \
         WHERE b.individual_id = i.id AND NOT b.is_deleted \
           AND b.benefit_plan_id = ${param})"
    )
}

fn in_plan_at_status(plan_param: usize, status_param: usize) -> String {
    format!(
        "EXISTS (SELECT 1 FROM registry.beneficiaries b \
         WHERE b.individual_id = i.id AND NOT b.is_deleted \
           AND b.benefit_plan_id = ${plan_param} AND b.status = ${status_param})"
    )
}

/// Input of a confirmation request, as delivered by the mutation layer
#[derive(Debug, Clone)]
pub struct ConfirmEnrollmentRequest {
    pub benefit_plan_id: Uuid,
    pub status: String,
    pub custom_filters: Vec<String>,
    pub client_mutation_id: Option<String>,
}

/// What a confirmation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Beneficiary rows were written for this many individuals
    Applied { enrolled: usize },
    /// Maker-checker is on; the confirmation awaits a second approver
    Deferred { approval_id: Uuid },
}

#[derive(Clone)]
pub struct EnrollmentService {
    pool: PgPool,
    config: RegistryConfig,
    registry: FieldRegistry,
    visibility: VisibilityFilter,
    benefits: BenefitRepository,
    mutation_log: MutationLogRepository,
}

impl EnrollmentService {
    pub fn new(pool: PgPool, config: RegistryConfig) -> Self {
        let registry = FieldRegistry::with_json_fields(config.filter_json_fields.clone());
        let visibility = VisibilityFilter::new(config.row_security);
        Self {
            benefits: BenefitRepository::new(pool.clone()),
            mutation_log: MutationLogRepository::new(pool.clone()),
            pool,
            config,
            registry,
            visibility,
        }
    }

    /// Compute the eight-field enrollment summary for a plan and target
    /// status under the requesting user's visibility.
    pub async fn summary(
        &self,
        benefit_plan_id: Uuid,
        status: &str,
        custom_filters: &[String],
        user: &UserContext,
    ) -> Result<EnrollmentSummary> {
        let status = BeneficiaryStatus::parse(status)?;
        let filters = parse_custom_filters(custom_filters, &self.registry)?;

        let plan = self
            .benefits
            .get_plan(benefit_plan_id)
            .await?
            .ok_or(RegistryError::NotFound {
                entity: "BenefitPlan",
                id: benefit_plan_id,
            })?;

        let mut conn = self.pool.acquire().await?;
        self.compute_summary(&mut conn, &plan, status, &filters, user)
            .await
    }

    /// Confirm a bulk enrollment. The outcome (success, capacity error,
    /// validation error) also lands on the mutation log keyed by the
    /// returned `internal_id`; mutation-level failures are returned as
    /// errors after being recorded.
    pub async fn confirm(
        &self,
        request: ConfirmEnrollmentRequest,
        user: &UserContext,
    ) -> Result<MutationResult> {
        let (result, internal_id) = self.register_mutation(&request).await?;

        match self.confirm_inner(&request, user, internal_id).await {
            Ok(outcome) => {
                self.finalize_success(internal_id, outcome).await?;
                Ok(result)
            }
            Err(e) => {
                self.finalize_error(internal_id, &e).await?;
                Err(e)
            }
        }
    }

    /// Confirm on a background task, returning the mutation identifiers
    /// immediately. The caller awaits completion through the mutation log.
    pub async fn confirm_detached(
        &self,
        request: ConfirmEnrollmentRequest,
        user: &UserContext,
    ) -> Result<MutationResult> {
        let (result, internal_id) = self.register_mutation(&request).await?;

        let service = self.clone();
        let user = user.clone();
        tokio::spawn(async move {
            let outcome = service.confirm_inner(&request, &user, internal_id).await;
            let finalize = match outcome {
                Ok(outcome) => service.finalize_success(internal_id, outcome).await,
                Err(e) => service.finalize_error(internal_id, &e).await,
            };
            if let Err(e) = finalize {
                warn!("Failed to record outcome of mutation {}: {}", internal_id, e);
            }
        });

        Ok(result)
    }

    /// Apply a pending maker-checker confirmation.
    pub async fn approve(&self, approval_id: Uuid, user: &UserContext) -> Result<ConfirmOutcome> {
        let approval = self.get_pending_approval(approval_id).await?;
        let filters = parse_custom_filters(&approval.custom_filters, &self.registry)?;

        let outcome = self
            .apply_enrollment(approval.benefit_plan_id, approval.status, &filters, user)
            .await;

        match outcome {
            Ok(enrolled) => {
                self.decide_approval(approval_id, ApprovalState::Approved, &user.username)
                    .await?;
                if let Some(internal_id) = approval.mutation_internal_id {
                    self.mutation_log.mark_success(internal_id).await?;
                }
                Ok(ConfirmOutcome::Applied { enrolled })
            }
            Err(e) => {
                if let Some(internal_id) = approval.mutation_internal_id {
                    self.finalize_error(internal_id, &e).await?;
                }
                Err(e)
            }
        }
    }

    /// Reject a pending maker-checker confirmation. No beneficiary writes
    /// ever happen for a rejected confirmation.
    pub async fn reject(&self, approval_id: Uuid, user: &UserContext) -> Result<()> {
        let approval = self.get_pending_approval(approval_id).await?;
        self.decide_approval(approval_id, ApprovalState::Rejected, &user.username)
            .await?;
        if let Some(internal_id) = approval.mutation_internal_id {
            self.mutation_log
                .mark_error(internal_id, json!({ "code": "mutation.enrollment_rejected" }))
                .await?;
        }
        info!("Rejected enrollment approval {}", approval_id);
        Ok(())
    }

    async fn register_mutation(
        &self,
        request: &ConfirmEnrollmentRequest,
    ) -> Result<(MutationResult, Uuid)> {
        let client_mutation_id = request
            .client_mutation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let entry = self
            .mutation_log
            .create(MUTATION_LABEL, &client_mutation_id)
            .await?;
        Ok((
            MutationResult {
                client_mutation_id,
                internal_id: entry.internal_id,
            },
            entry.internal_id,
        ))
    }

    async fn confirm_inner(
        &self,
        request: &ConfirmEnrollmentRequest,
        user: &UserContext,
        internal_id: Uuid,
    ) -> Result<ConfirmOutcome> {
        let status = BeneficiaryStatus::parse(&request.status)?;
        let filters = parse_custom_filters(&request.custom_filters, &self.registry)?;

        if self.config.enable_maker_checker_enrollment {
            // Validate the plan before recording the pending review.
            self.benefits
                .get_plan(request.benefit_plan_id)
                .await?
                .ok_or(RegistryError::NotFound {
                    entity: "BenefitPlan",
                    id: request.benefit_plan_id,
                })?;
            let approval_id = self
                .record_approval(request, status, user, internal_id)
                .await?;
            info!(
                "Enrollment into plan {} recorded for review as approval {}",
                request.benefit_plan_id, approval_id
            );
            return Ok(ConfirmOutcome::Deferred { approval_id });
        }

        let enrolled = self
            .apply_enrollment(request.benefit_plan_id, status, &filters, user)
            .await?;
        Ok(ConfirmOutcome::Applied { enrolled })
    }

    /// One transaction for the capacity check and the batch write: the plan
    /// row is locked first, so two concurrent confirmations of the same
    /// plan cannot jointly exceed its capacity.
    async fn apply_enrollment(
        &self,
        benefit_plan_id: Uuid,
        status: BeneficiaryStatus,
        filters: &FilterSet,
        user: &UserContext,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let plan = self
            .benefits
            .get_plan_for_update(&mut tx, benefit_plan_id)
            .await?;
        let summary = self
            .compute_summary(&mut tx, &plan, status, filters, user)
            .await?;

        if summary.max_active_beneficiaries_exceeded {
            tx.rollback().await?;
            return Err(RegistryError::CapacityExceeded {
                benefit_plan_id,
                current_active: summary
                    .number_of_individuals_assigned_to_selected_programme_and_status,
                to_enroll: summary.number_of_individuals_to_upload,
                max_beneficiaries: i64::from(plan.max_beneficiaries.unwrap_or(0)),
            });
        }

        let to_enroll = self.select_to_enroll(&mut tx, &plan, filters, user).await?;
        for individual_id in &to_enroll {
            self.benefits
                .enroll(&mut tx, *individual_id, plan.id, status, &user.username)
                .await?;
        }
        tx.commit().await?;

        info!(
            "Enrolled {} individual(s) into plan {} at status {}",
            to_enroll.len(),
            plan.code,
            status
        );
        Ok(to_enroll.len())
    }

    async fn compute_summary(
        &self,
        conn: &mut PgConnection,
        plan: &BenefitPlan,
        status: BeneficiaryStatus,
        filters: &FilterSet,
        user: &UserContext,
    ) -> Result<EnrollmentSummary> {
        let vis = self.visibility.individual_predicate(user, "i", 1);
        let (filter_sql, filter_values) = filters.to_sql("i", 1 + vis.binds.len());
        let plan_param = 1 + vis.binds.len() + filter_values.len();

        let mut selected_binds = vis.binds.clone();
        selected_binds.extend(filter_values.into_iter().map(SqlBind::from));

        let base = format!(
            "SELECT COUNT(*) FROM registry.individuals i \
             WHERE NOT i.is_deleted AND {}",
            vis.sql
        );
        let selected_base = format!("{base} AND {NOT_IN_GROUP} AND {filter_sql}");

        let total = fetch_scalar_i64(&mut *conn, &base, &vis.binds).await?;
        let selected = fetch_scalar_i64(&mut *conn, &selected_base, &selected_binds).await?;

        let any_plan_sql = format!("{selected_base} AND {IN_ANY_PLAN}");
        let any_plan = fetch_scalar_i64(&mut *conn, &any_plan_sql, &selected_binds).await?;

        let selected_plan_sql = format!("{selected_base} AND {}", in_plan(plan_param));
        let mut selected_plan_binds = selected_binds.clone();
        selected_plan_binds.push(SqlBind::Uuid(plan.id));
        let selected_plan =
            fetch_scalar_i64(&mut *conn, &selected_plan_sql, &selected_plan_binds).await?;

        // Deliberately filter-independent: the plan's true current
        // population at the target status.
        let status_plan_param = 1 + vis.binds.len();
        let all_plan_status_sql = format!(
            "{base} AND {}",
            in_plan_at_status(status_plan_param, status_plan_param + 1)
        );
        let mut all_plan_status_binds = vis.binds.clone();
        all_plan_status_binds.push(SqlBind::Uuid(plan.id));
        all_plan_status_binds.push(SqlBind::Str(status.as_str().to_string()));
        let all_plan_status =
            fetch_scalar_i64(&mut *conn, &all_plan_status_sql, &all_plan_status_binds).await?;

        let to_enroll = selected - selected_plan;
        let max_active_beneficiaries_exceeded = status == BeneficiaryStatus::Active
            && plan
                .max_beneficiaries
                .map(|max| all_plan_status + to_enroll > i64::from(max))
                .unwrap_or(false);

        Ok(EnrollmentSummary {
            total_number_of_individuals: total,
            number_of_selected_individuals: selected,
            number_of_individuals_assigned_to_programme: any_plan,
            number_of_individuals_not_assigned_to_programme: selected - any_plan,
            number_of_individuals_assigned_to_selected_programme: selected_plan,
            number_of_individuals_assigned_to_selected_programme_and_status: all_plan_status,
            number_of_individuals_to_upload: to_enroll,
            max_active_beneficiaries_exceeded,
        })
    }

    /// Ids behind `to_enroll`: the selected set minus individuals already
    /// linked to the plan at any status.
    async fn select_to_enroll(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        plan: &BenefitPlan,
        filters: &FilterSet,
        user: &UserContext,
    ) -> Result<Vec<Uuid>> {
        let vis = self.visibility.individual_predicate(user, "i", 1);
        let (filter_sql, filter_values) = filters.to_sql("i", 1 + vis.binds.len());
        let plan_param = 1 + vis.binds.len() + filter_values.len();

        let sql = format!(
            "SELECT i.id FROM registry.individuals i \
             WHERE NOT i.is_deleted AND {} AND {NOT_IN_GROUP} AND {filter_sql} \
               AND NOT {} \
             ORDER BY i.date_created",
            vis.sql,
            in_plan(plan_param)
        );

        let mut binds = vis.binds;
        binds.extend(filter_values.into_iter().map(SqlBind::from));
        binds.push(SqlBind::Uuid(plan.id));

        Ok(fetch_uuids(&mut **tx, &sql, &binds).await?)
    }

    async fn finalize_success(&self, internal_id: Uuid, outcome: ConfirmOutcome) -> Result<()> {
        match outcome {
            // Deferred confirmations stay RECEIVED until the reviewer decides.
            ConfirmOutcome::Deferred { .. } => Ok(()),
            ConfirmOutcome::Applied { .. } => self.mutation_log.mark_success(internal_id).await,
        }
    }

    async fn finalize_error(&self, internal_id: Uuid, error: &RegistryError) -> Result<()> {
        self.mutation_log
            .mark_error(
                internal_id,
                json!({ "code": error.mutation_label(), "detail": error.to_string() }),
            )
            .await
    }

    async fn record_approval(
        &self,
        request: &ConfirmEnrollmentRequest,
        status: BeneficiaryStatus,
        user: &UserContext,
        internal_id: Uuid,
    ) -> Result<Uuid> {
        let approval_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO registry.enrollment_approvals (
                benefit_plan_id, status, custom_filters, requested_by, mutation_internal_id
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(request.benefit_plan_id)
        .bind(status.as_str())
        .bind(serde_json::to_value(&request.custom_filters)?)
        .bind(&user.username)
        .bind(internal_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(approval_id)
    }

    async fn get_pending_approval(&self, approval_id: Uuid) -> Result<EnrollmentApproval> {
        let row = sqlx::query(
            r#"
            SELECT id, benefit_plan_id, status, custom_filters, requested_by,
                   state, mutation_internal_id, decided_by, date_created, date_updated
            FROM registry.enrollment_approvals
            WHERE id = $1
            "#,
        )
        .bind(approval_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(RegistryError::NotFound {
                entity: "EnrollmentApproval",
                id: approval_id,
            });
        };

        let state: ApprovalState = row
            .get::<String, _>("state")
            .parse()
            .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))?;
        if state != ApprovalState::Pending {
            return Err(RegistryError::Validation(ValidationError::InvalidState {
                entity: "EnrollmentApproval",
                id: approval_id,
                reason: format!("already decided as {}", state.as_str()),
            }));
        }

        let status: BeneficiaryStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| RegistryError::Database(sqlx::Error::Decode(e.into())))?;
        let custom_filters: Vec<String> = serde_json::from_value(row.get("custom_filters"))?;

        Ok(EnrollmentApproval {
            id: row.get("id"),
            benefit_plan_id: row.get("benefit_plan_id"),
            status,
            custom_filters,
            requested_by: row.get("requested_by"),
            state,
            mutation_internal_id: row.get("mutation_internal_id"),
            decided_by: row.get("decided_by"),
            date_created: row.get("date_created"),
            date_updated: row.get("date_updated"),
        })
    }

    async fn decide_approval(
        &self,
        approval_id: Uuid,
        state: ApprovalState,
        username: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registry.enrollment_approvals
            SET state = $2, decided_by = $3, date_updated = NOW()
            WHERE id = $1 AND state = 'PENDING'
            "#,
        )
        .bind(approval_id)
        .bind(state.as_str())
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
