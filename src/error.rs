//! Error handling for the individual registry
//!
//! Typed errors using thiserror so callers can distinguish mutation-level
//! outcomes (validation, capacity) from transport failures.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for registry services
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Maximum active beneficiaries exceeded for plan {benefit_plan_id}: {current_active} active + {to_enroll} to enroll > {max_beneficiaries}")]
    CapacityExceeded {
        benefit_plan_id: Uuid,
        current_active: i64,
        to_enroll: i64,
        max_beneficiaries: i64,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Version conflict on {entity} {id}: expected version {expected}")]
    Concurrency {
        entity: &'static str,
        id: Uuid,
        expected: i32,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while parsing or validating custom-filter expressions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed filter expression '{expression}': {reason}")]
    MalformedFilter { expression: String, reason: String },

    #[error("Unknown filter field '{field}'")]
    UnknownField { field: String },

    #[error("Unknown lookup '{lookup}' in filter '{expression}'")]
    UnknownLookup { lookup: String, expression: String },

    #[error("Unknown value type '{type_tag}' in filter '{expression}'")]
    UnknownType {
        type_tag: String,
        expression: String,
    },

    #[error("Cannot coerce '{value}' to {type_tag}")]
    Coercion { value: String, type_tag: String },

    #[error("Unknown beneficiary status '{status}'")]
    UnknownStatus { status: String },

    #[error("Invalid state for {entity} {id}: {reason}")]
    InvalidState {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },
}

impl RegistryError {
    /// True for errors that surface as structured mutation-log outcomes
    /// rather than aborting the request with a transport failure.
    pub fn is_mutation_level(&self) -> bool {
        matches!(
            self,
            RegistryError::Validation(_) | RegistryError::CapacityExceeded { .. }
        )
    }

    /// Stable message key recorded in the mutation log, mirroring what the
    /// client-facing layer translates for display.
    pub fn mutation_label(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "mutation.invalid_custom_filter",
            RegistryError::CapacityExceeded { .. } => "mutation.max_active_beneficiaries_exceeded",
            RegistryError::NotFound { .. } => "mutation.not_found",
            RegistryError::Concurrency { .. } => "mutation.version_conflict",
            _ => "mutation.failed",
        }
    }
}

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
