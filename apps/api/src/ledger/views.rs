//! Reshapes flat relational rows into the nested view models returned to callers:
//! members with their claimed chores, redeemed rewards and deductions embedded,
//! and catalog items with the members that used them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::catalog::{AssociationRow, CatalogItemRow, CatalogKind, ItemStatus};
use crate::models::member::{DeductionRow, MemberRow};
use crate::store::LedgerTx;

/// A member as seen from a catalog item, annotated with that member's usage of it.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedMember {
    pub id: i64,
    pub name: String,
    pub points: i64,
    pub count: i32,
    pub date: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogItemView {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub points: i32,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub members: Vec<LinkedMember>,
}

/// A catalog item as seen from a member, annotated with the member's count and dates.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedItem {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub points: i32,
    pub status: ItemStatus,
    pub count: i32,
    pub date: Vec<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeductionView {
    pub id: Uuid,
    pub reason: String,
    pub points: i64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub points_deducted: Vec<DeductionView>,
    pub chore: Vec<LinkedItem>,
    pub reward: Vec<LinkedItem>,
    /// Sum of claim counts across all chores.
    pub chores_completed: i64,
    /// Sum of redemption counts across all rewards.
    pub rewards_redeemed: i64,
}

/// Balance summary returned by claim and redeem.
#[derive(Debug, Clone, Serialize)]
pub struct MemberBalance {
    pub id: i64,
    pub name: String,
    pub points: i64,
}

impl From<MemberRow> for MemberBalance {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            points: row.points,
        }
    }
}

fn description_for(kind: CatalogKind, item: &CatalogItemRow) -> Option<String> {
    match kind {
        CatalogKind::Chore => None,
        CatalogKind::Reward => Some(item.description.clone()),
    }
}

/// Builds item views, embedding every member linked to each item.
/// Links whose member is not in `members` are skipped.
pub fn item_views(
    kind: CatalogKind,
    items: Vec<CatalogItemRow>,
    links: &[AssociationRow],
    members: &[MemberRow],
) -> Vec<CatalogItemView> {
    let members_by_id: HashMap<i64, &MemberRow> = members.iter().map(|m| (m.id, m)).collect();
    let mut links_by_item: HashMap<i64, Vec<&AssociationRow>> = HashMap::new();
    for link in links {
        links_by_item.entry(link.item_id).or_default().push(link);
    }

    items
        .into_iter()
        .map(|item| {
            let linked = links_by_item
                .get(&item.id)
                .map(|links| {
                    links
                        .iter()
                        .filter_map(|link| {
                            members_by_id.get(&link.member_id).map(|m| LinkedMember {
                                id: m.id,
                                name: m.name.clone(),
                                points: m.points,
                                count: link.count,
                                date: link.date.clone(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            CatalogItemView {
                id: item.id,
                description: description_for(kind, &item),
                name: item.name,
                points: item.points,
                status: item.status,
                created_at: item.created_at,
                members: linked,
            }
        })
        .collect()
}

/// Every row needed to render the owner's members, read in one transaction.
pub struct LedgerSnapshot {
    pub members: Vec<MemberRow>,
    pub deductions: Vec<DeductionRow>,
    pub chores: Vec<CatalogItemRow>,
    pub chore_links: Vec<AssociationRow>,
    pub rewards: Vec<CatalogItemRow>,
    pub reward_links: Vec<AssociationRow>,
}

impl LedgerSnapshot {
    pub async fn load(tx: &mut dyn LedgerTx, owner: &str) -> Result<Self, AppError> {
        Ok(Self {
            members: tx.list_members(owner).await?,
            deductions: tx.list_deductions(owner).await?,
            chores: tx.list_items(owner, CatalogKind::Chore, None).await?,
            chore_links: tx.list_links(owner, CatalogKind::Chore).await?,
            rewards: tx.list_items(owner, CatalogKind::Reward, None).await?,
            reward_links: tx.list_links(owner, CatalogKind::Reward).await?,
        })
    }

    pub fn into_member_views(self) -> Vec<MemberView> {
        let chores: HashMap<i64, &CatalogItemRow> = self.chores.iter().map(|c| (c.id, c)).collect();
        let rewards: HashMap<i64, &CatalogItemRow> =
            self.rewards.iter().map(|r| (r.id, r)).collect();

        self.members
            .iter()
            .map(|member| {
                let chore = linked_items(
                    CatalogKind::Chore,
                    member.id,
                    &self.chore_links,
                    &chores,
                );
                let reward = linked_items(
                    CatalogKind::Reward,
                    member.id,
                    &self.reward_links,
                    &rewards,
                );
                let points_deducted = self
                    .deductions
                    .iter()
                    .filter(|d| d.member_id == member.id)
                    .map(|d| DeductionView {
                        id: d.id,
                        reason: d.reason.clone(),
                        points: d.points,
                        date: d.created_at,
                    })
                    .collect();

                MemberView {
                    id: member.id,
                    name: member.name.clone(),
                    role: member.role.clone(),
                    points: member.points,
                    created_at: member.created_at,
                    chores_completed: chore.iter().map(|c| i64::from(c.count)).sum(),
                    rewards_redeemed: reward.iter().map(|r| i64::from(r.count)).sum(),
                    points_deducted,
                    chore,
                    reward,
                }
            })
            .collect()
    }
}

fn linked_items(
    kind: CatalogKind,
    member_id: i64,
    links: &[AssociationRow],
    items: &HashMap<i64, &CatalogItemRow>,
) -> Vec<LinkedItem> {
    links
        .iter()
        .filter(|link| link.member_id == member_id)
        .filter_map(|link| {
            items.get(&link.item_id).map(|item| LinkedItem {
                id: item.id,
                name: item.name.clone(),
                description: description_for(kind, item),
                points: item.points,
                status: item.status,
                count: link.count,
                date: link.date.clone(),
                created_at: item.created_at,
            })
        })
        .collect()
}
