//! Individual registry - household and enrollment core
//!
//! Persisted entities for individuals and household groups, bulk-import
//! pipelines for beneficiary records, and the enrollment workflows that
//! compute summary statistics and confirm bulk enrollment into benefit
//! plans. The GraphQL schema, authentication, and migration tooling live in
//! the surrounding application; this crate is the domain core they call.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use individual_registry::config::RegistryConfig;
//! use individual_registry::database::DatabaseManager;
//! use individual_registry::services::{EnrollmentService, UserContext};
//!
//! # async fn run(benefit_plan_id: uuid::Uuid) -> anyhow::Result<()> {
//! let db = DatabaseManager::with_default_config().await?;
//! db.run_migrations().await?;
//!
//! let enrollment = EnrollmentService::new(db.pool().clone(), RegistryConfig::default());
//! let summary = enrollment
//!     .summary(
//!         benefit_plan_id,
//!         "ACTIVE",
//!         &["number_of_children__gte__integer=1".to_string()],
//!         &UserContext::admin("admin"),
//!     )
//!     .await?;
//! println!("{} individual(s) to enroll", summary.number_of_individuals_to_upload);
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Persisted entity types
pub mod models;

// Runtime configuration
pub mod config;

// Database integration
pub mod database;

// Custom-filter expressions
pub mod filters;

// Domain services
pub mod services;

pub use config::RegistryConfig;
pub use database::{DatabaseConfig, DatabaseManager};
pub use error::{RegistryError, Result, ValidationError};
pub use models::EnrollmentSummary;
pub use services::{
    ConfirmEnrollmentRequest, EnrollmentService, GroupAlignmentService, ImportService,
    MutationLogService, UserContext, UserScope, VisibilityFilter,
};

/// Initialize tracing for binaries and tests embedding the registry.
/// Respects `RUST_LOG`; defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
