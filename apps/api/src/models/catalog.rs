use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which catalog an item belongs to. Chores and rewards share one lifecycle and
/// differ only in the direction points flow when a member uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Chore,
    Reward,
}

impl CatalogKind {
    pub fn label(self) -> &'static str {
        match self {
            CatalogKind::Chore => "chore",
            CatalogKind::Reward => "reward",
        }
    }

    /// Balance change for one claim (chore) or redemption (reward) of an item worth `points`.
    pub fn event_delta(self, points: i32) -> i64 {
        match self {
            CatalogKind::Chore => i64::from(points),
            CatalogKind::Reward => -i64::from(points),
        }
    }

    /// Balance change that undoes `count` events of an item worth `points`.
    pub fn reversal_delta(self, points: i32, count: i32) -> i64 {
        -self.event_delta(points) * i64::from(count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "item_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Removed,
}

/// A chore or reward row. Chores carry an empty description.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CatalogItemRow {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub points: i32,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Join row between a member and a chore (claims) or a reward (redemptions).
/// `count` always equals `date.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AssociationRow {
    pub member_id: i64,
    pub item_id: i64,
    pub count: i32,
    pub date: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub points: i32,
}

#[derive(Debug, Clone)]
pub struct ItemChanges {
    pub name: String,
    pub description: Option<String>,
    pub points: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chore_claim_credits_and_reward_redeem_debits() {
        assert_eq!(CatalogKind::Chore.event_delta(50), 50);
        assert_eq!(CatalogKind::Reward.event_delta(200), -200);
    }

    #[test]
    fn test_reversal_undoes_every_event() {
        assert_eq!(CatalogKind::Chore.reversal_delta(10, 3), -30);
        assert_eq!(CatalogKind::Reward.reversal_delta(25, 2), 50);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::Removed).unwrap(),
            "\"removed\""
        );
    }
}
