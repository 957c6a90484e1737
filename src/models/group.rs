use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A household unit. `json_ext` carries the denormalized summary
/// (current head, current primary recipient, member count) maintained by
/// the alignment service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub code: String,
    pub json_ext: serde_json::Value,
    pub village_id: Option<Uuid>,
}

/// Household role carried by a membership edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    Head,
    Spouse,
    Son,
    Daughter,
    Grandfather,
    Grandmother,
    Mother,
    Father,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Head => "HEAD",
            GroupRole::Spouse => "SPOUSE",
            GroupRole::Son => "SON",
            GroupRole::Daughter => "DAUGHTER",
            GroupRole::Grandfather => "GRANDFATHER",
            GroupRole::Grandmother => "GRANDMOTHER",
            GroupRole::Mother => "MOTHER",
            GroupRole::Father => "FATHER",
        }
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEAD" => Ok(GroupRole::Head),
            "SPOUSE" => Ok(GroupRole::Spouse),
            "SON" => Ok(GroupRole::Son),
            "DAUGHTER" => Ok(GroupRole::Daughter),
            "GRANDFATHER" => Ok(GroupRole::Grandfather),
            "GRANDMOTHER" => Ok(GroupRole::Grandmother),
            "MOTHER" => Ok(GroupRole::Mother),
            "FATHER" => Ok(GroupRole::Father),
            other => Err(format!("unknown group role: {other}")),
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a member receives benefits on behalf of the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Primary,
    Secondary,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Primary => "PRIMARY",
            RecipientType::Secondary => "SECONDARY",
        }
    }
}

impl FromStr for RecipientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRIMARY" => Ok(RecipientType::Primary),
            "SECONDARY" => Ok(RecipientType::Secondary),
            other => Err(format!("unknown recipient type: {other}")),
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership edge between a group and an individual
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupIndividual {
    pub id: Uuid,
    pub version: i32,
    pub is_deleted: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub user_created: Option<String>,
    pub user_updated: Option<String>,
    pub group_id: Uuid,
    pub individual_id: Uuid,
    pub role: Option<GroupRole>,
    pub recipient_type: Option<RecipientType>,
    pub json_ext: serde_json::Value,
}

/// Denormalized group projection persisted into `Group::json_ext`.
/// Absent head/primary serialize as explicit nulls so that merging the
/// summary into `json_ext` clears stale names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub head: Option<String>,
    pub primary_recipient: Option<String>,
    pub members: i64,
}
