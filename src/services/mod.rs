//! Domain services over the entity store
//!
//! Visibility scoping, group alignment, the enrollment summary and
//! confirmation engine, the bulk-import pipeline, and the mutation-log
//! completion signal.

pub mod enrollment;
pub mod group_alignment;
pub mod import;
pub mod mutation_log;
pub mod visibility;

pub use enrollment::{ConfirmEnrollmentRequest, ConfirmOutcome, EnrollmentService};
pub use group_alignment::{GroupAlignmentService, MembershipInput};
pub use import::{ImportOutcome, ImportService};
pub use mutation_log::MutationLogService;
pub use visibility::{SqlPredicate, UserContext, UserScope, VisibilityFilter};
