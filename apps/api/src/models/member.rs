use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct MemberRow {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

/// One point deduction. Identified by a stable id rather than its list position.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct DeductionRow {
    pub id: Uuid,
    pub member_id: i64,
    pub reason: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub role: String,
    pub points: i64,
}

#[derive(Debug, Clone)]
pub struct MemberChanges {
    pub name: String,
    /// `None` keeps the current role.
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDeduction {
    pub id: Uuid,
    pub reason: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}
