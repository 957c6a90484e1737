use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Processing state of a bulk-import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Triggered,
    InProgress,
    Success,
    PartialSuccess,
    WaitingForVerification,
    Fail,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Triggered => "TRIGGERED",
            UploadStatus::InProgress => "IN_PROGRESS",
            UploadStatus::Success => "SUCCESS",
            UploadStatus::PartialSuccess => "PARTIAL_SUCCESS",
            UploadStatus::WaitingForVerification => "WAITING_FOR_VERIFICATION",
            UploadStatus::Fail => "FAIL",
        }
    }

    /// Terminal states cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Success | UploadStatus::PartialSuccess | UploadStatus::Fail
        )
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(UploadStatus::Pending),
            "TRIGGERED" => Ok(UploadStatus::Triggered),
            "IN_PROGRESS" => Ok(UploadStatus::InProgress),
            "SUCCESS" => Ok(UploadStatus::Success),
            "PARTIAL_SUCCESS" => Ok(UploadStatus::PartialSuccess),
            "WAITING_FOR_VERIFICATION" => Ok(UploadStatus::WaitingForVerification),
            "FAIL" => Ok(UploadStatus::Fail),
            other => Err(format!("unknown upload status: {other}")),
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk-import batch of individual or group records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualDataSourceUpload {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub source_name: String,
    pub source_type: String,
    pub status: UploadStatus,
    pub error: serde_json::Value,
}

/// One staged row of an upload. `json_ext` holds the raw payload;
/// `individual_id` is linked once the row has been materialized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IndividualDataSource {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub individual_id: Option<Uuid>,
    pub upload_id: Option<Uuid>,
    pub json_ext: serde_json::Value,
    pub validations: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupDataSource {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub group_id: Option<Uuid>,
    pub upload_id: Option<Uuid>,
    pub json_ext: serde_json::Value,
    pub validations: serde_json::Value,
}

/// Audit record tying an upload to the workflow that processed it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IndividualDataUploadRecord {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub data_upload_id: Uuid,
    pub workflow: String,
}
