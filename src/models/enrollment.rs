use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::ValidationError;

/// A benefit plan, owned by the benefit-plan subsystem. The enrollment
/// engine reads `max_beneficiaries` as the active-beneficiary capacity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BenefitPlan {
    pub id: Uuid,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub code: String,
    pub name: String,
    pub plan_type: String,
    pub max_beneficiaries: Option<i32>,
}

/// Membership status of an individual within a benefit plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeneficiaryStatus {
    Potential,
    Active,
    Graduated,
    Suspended,
}

impl BeneficiaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeneficiaryStatus::Potential => "POTENTIAL",
            BeneficiaryStatus::Active => "ACTIVE",
            BeneficiaryStatus::Graduated => "GRADUATED",
            BeneficiaryStatus::Suspended => "SUSPENDED",
        }
    }

    /// Parse a caller-supplied status string, surfacing a validation error
    /// instead of a silent mismatch.
    pub fn parse(status: &str) -> Result<Self, ValidationError> {
        status
            .parse()
            .map_err(|_| ValidationError::UnknownStatus {
                status: status.to_string(),
            })
    }
}

impl FromStr for BeneficiaryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POTENTIAL" => Ok(BeneficiaryStatus::Potential),
            "ACTIVE" => Ok(BeneficiaryStatus::Active),
            "GRADUATED" => Ok(BeneficiaryStatus::Graduated),
            "SUSPENDED" => Ok(BeneficiaryStatus::Suspended),
            other => Err(format!("unknown beneficiary status: {other}")),
        }
    }
}

impl fmt::Display for BeneficiaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record linking an individual to a benefit plan with a status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub individual_id: Uuid,
    pub benefit_plan_id: Uuid,
    pub status: BeneficiaryStatus,
    pub json_ext: serde_json::Value,
}

/// The fixed-shape enrollment summary returned to the caller.
///
/// `total` deliberately counts grouped individuals while `selected` and the
/// fields derived from it exclude them; groups enroll as units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    pub total_number_of_individuals: i64,
    pub number_of_selected_individuals: i64,
    pub number_of_individuals_assigned_to_programme: i64,
    pub number_of_individuals_not_assigned_to_programme: i64,
    pub number_of_individuals_assigned_to_selected_programme: i64,
    pub number_of_individuals_assigned_to_selected_programme_and_status: i64,
    pub number_of_individuals_to_upload: i64,
    pub max_active_beneficiaries_exceeded: bool,
}

/// Processing state of a mutation-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationStatus {
    Received,
    Success,
    Error,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Received => "RECEIVED",
            MutationStatus::Success => "SUCCESS",
            MutationStatus::Error => "ERROR",
        }
    }
}

impl FromStr for MutationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(MutationStatus::Received),
            "SUCCESS" => Ok(MutationStatus::Success),
            "ERROR" => Ok(MutationStatus::Error),
            other => Err(format!("unknown mutation status: {other}")),
        }
    }
}

/// Structured mutation-log entry clients poll by `internal_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationLogEntry {
    pub internal_id: Uuid,
    pub client_mutation_id: String,
    pub label: String,
    pub status: MutationStatus,
    pub error: Option<serde_json::Value>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Identifier pair returned by enrollment confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub client_mutation_id: String,
    pub internal_id: Uuid,
}

/// Review state of a maker-checker enrollment confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Pending => "PENDING",
            ApprovalState::Approved => "APPROVED",
            ApprovalState::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ApprovalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApprovalState::Pending),
            "APPROVED" => Ok(ApprovalState::Approved),
            "REJECTED" => Ok(ApprovalState::Rejected),
            other => Err(format!("unknown approval state: {other}")),
        }
    }
}

/// A confirmation recorded for second-approver review instead of being
/// applied immediately
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentApproval {
    pub id: Uuid,
    pub benefit_plan_id: Uuid,
    pub status: BeneficiaryStatus,
    pub custom_filters: Vec<String>,
    pub requested_by: String,
    pub state: ApprovalState,
    pub mutation_internal_id: Option<Uuid>,
    pub decided_by: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}
