use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered individual, optionally attached to a village location.
///
/// `json_ext` holds free-form extension attributes (e.g. survey answers)
/// that the custom-filter grammar can query by registered field name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Individual {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    pub json_ext: serde_json::Value,
    pub village_id: Option<Uuid>,
}

impl Individual {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Data for creating a new individual
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIndividual {
    pub first_name: String,
    pub last_name: String,
    pub dob: NaiveDate,
    #[serde(default = "default_json_ext")]
    pub json_ext: serde_json::Value,
    pub village_id: Option<Uuid>,
}

/// Partial update for an individual; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIndividual {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub json_ext: Option<serde_json::Value>,
    pub village_id: Option<Option<Uuid>>,
}

fn default_json_ext() -> serde_json::Value {
    serde_json::json!({})
}
