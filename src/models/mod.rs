//! Persisted entity types for the registry
//!
//! Every registry-owned row carries the history columns (version,
//! soft-delete flag, audit timestamps and usernames). Rows are never hard
//! deleted; updates bump the version and deletes set `is_deleted`.

pub mod enrollment;
pub mod group;
pub mod import;
pub mod individual;

pub use enrollment::{
    ApprovalState, Beneficiary, BeneficiaryStatus, BenefitPlan, EnrollmentApproval,
    EnrollmentSummary, MutationLogEntry, MutationResult, MutationStatus,
};
pub use group::{Group, GroupIndividual, GroupRole, GroupSummary, RecipientType};
pub use import::{
    GroupDataSource, IndividualDataSource, IndividualDataSourceUpload,
    IndividualDataUploadRecord, UploadStatus,
};
pub use individual::{Individual, NewIndividual, UpdateIndividual};
