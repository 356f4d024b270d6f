//! Chore catalog & claim engine, reward catalog & redemption engine.
//!
//! Both catalogs share one lifecycle (add → edit → soft delete ⇄ restore →
//! permanent delete). They differ only in what using an item does to a
//! member's balance: claiming a chore credits its points, redeeming a reward
//! debits its cost and requires the member to afford it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::ledger::validation::{item_points, require_text};
use crate::ledger::views::{item_views, CatalogItemView, MemberBalance};
use crate::models::catalog::{
    AssociationRow, CatalogItemRow, CatalogKind, ItemChanges, ItemStatus, NewItem,
};
use crate::store::{LedgerStore, LedgerTx, TxMode};

#[derive(Debug, Deserialize)]
pub struct ItemInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub member_id: i64,
}

/// Result of a claim or redemption: the member's new balance and the updated record.
#[derive(Debug, Serialize)]
pub struct EventReceipt {
    pub member: MemberBalance,
    pub record: AssociationRow,
}

#[derive(Debug, Serialize)]
pub struct RelationCheck {
    pub is_related: bool,
}

#[derive(Debug, Serialize)]
pub struct PointReversal {
    pub member_id: i64,
    pub count: i32,
    pub points_delta: i64,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub id: i64,
    pub kind: CatalogKind,
    pub reversals: Vec<PointReversal>,
}

fn not_found(kind: CatalogKind, id: i64) -> AppError {
    AppError::not_found(kind.label(), id)
}

/// Renders one item with its linked members, read inside the caller's transaction.
async fn single_view(
    tx: &mut dyn LedgerTx,
    owner: &str,
    kind: CatalogKind,
    item: CatalogItemRow,
) -> Result<CatalogItemView, AppError> {
    let item_id = item.id;
    let links: Vec<AssociationRow> = tx
        .list_links(owner, kind)
        .await?
        .into_iter()
        .filter(|link| link.item_id == item_id)
        .collect();
    let members = tx.list_members(owner).await?;
    item_views(kind, vec![item], &links, &members)
        .pop()
        .ok_or_else(|| not_found(kind, item_id))
}

/// Lists the owner's items in `status`, each with its member annotations.
pub async fn list_items(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    status: ItemStatus,
) -> Result<Vec<CatalogItemView>, AppError> {
    let mut tx = store.begin(TxMode::Snapshot).await?;
    let items = tx.list_items(owner, kind, Some(status)).await?;
    let links = tx.list_links(owner, kind).await?;
    let members = tx.list_members(owner).await?;
    tx.commit().await?;
    Ok(item_views(kind, items, &links, &members))
}

pub async fn add_item(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    input: ItemInput,
) -> Result<CatalogItemView, AppError> {
    let new = NewItem {
        name: require_text("name", &input.name)?,
        description: input.description.unwrap_or_default().trim().to_string(),
        points: item_points(input.points)?,
    };

    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let row = tx.insert_item(owner, kind, &new).await?;
    tx.commit().await?;

    info!("Added {} {} ({} points) for {owner}", kind.label(), row.id, row.points);
    item_views(kind, vec![row], &[], &[])
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("item view missing after insert")))
}

/// Updates name, points (and description for rewards). Associations are untouched.
pub async fn edit_item(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
    input: ItemInput,
) -> Result<CatalogItemView, AppError> {
    let changes = ItemChanges {
        name: require_text("name", &input.name)?,
        description: input.description.map(|d| d.trim().to_string()),
        points: item_points(input.points)?,
    };

    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let row = tx
        .update_item(owner, kind, id, &changes)
        .await?
        .ok_or_else(|| not_found(kind, id))?;
    let view = single_view(tx.as_mut(), owner, kind, row).await?;
    tx.commit().await?;
    Ok(view)
}

async fn set_status(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
    status: ItemStatus,
) -> Result<CatalogItemView, AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let row = tx
        .set_item_status(owner, kind, id, status)
        .await?
        .ok_or_else(|| not_found(kind, id))?;
    let view = single_view(tx.as_mut(), owner, kind, row).await?;
    tx.commit().await?;
    info!("Marked {} {id} as {status:?}", kind.label());
    Ok(view)
}

/// Moves an item to the trash. Idempotent.
pub async fn soft_delete(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
) -> Result<CatalogItemView, AppError> {
    set_status(store, owner, kind, id, ItemStatus::Removed).await
}

/// Moves an item back out of the trash. Idempotent.
pub async fn restore(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
) -> Result<CatalogItemView, AppError> {
    set_status(store, owner, kind, id, ItemStatus::Active).await
}

/// Whether any member has used the item. Only chooses the confirmation prompt
/// shown before a permanent delete; the delete itself does not consult it.
pub async fn check_relation(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
) -> Result<RelationCheck, AppError> {
    let mut tx = store.begin(TxMode::Snapshot).await?;
    let item = tx
        .find_item(owner, kind, id)
        .await?
        .ok_or_else(|| not_found(kind, id))?;
    let is_related = tx.has_links(kind, item.id).await?;
    tx.commit().await?;
    Ok(RelationCheck { is_related })
}

/// Deletes the item and all of its association rows, reversing the points every
/// association moved: claimers lose `points * count`, redeemers get it back.
pub async fn delete_permanently(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    id: i64,
) -> Result<PurgeReport, AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let item = tx
        .lock_item(owner, kind, id)
        .await?
        .ok_or_else(|| not_found(kind, id))?;

    let mut links = tx.remove_item_links(kind, item.id).await?;
    // Member rows are locked in id order so concurrent purges cannot deadlock.
    links.sort_by_key(|link| link.member_id);
    let mut reversals = Vec::with_capacity(links.len());
    for link in &links {
        let delta = kind.reversal_delta(item.points, link.count);
        let member = tx.adjust_points(link.member_id, delta).await?;
        reversals.push(PointReversal {
            member_id: member.id,
            count: link.count,
            points_delta: delta,
            balance: member.points,
        });
    }

    if !tx.delete_item(owner, kind, item.id).await? {
        return Err(not_found(kind, id));
    }
    tx.commit().await?;

    info!(
        "Permanently deleted {} {id}; reversed points for {} member(s)",
        kind.label(),
        reversals.len()
    );
    Ok(PurgeReport {
        id,
        kind,
        reversals,
    })
}

/// Applies one claim or redemption atomically: balance change plus association upsert.
async fn record_event(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    item_id: i64,
    member_id: i64,
) -> Result<EventReceipt, AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;

    let item = tx
        .lock_item(owner, kind, item_id)
        .await?
        .ok_or_else(|| not_found(kind, item_id))?;
    if item.status == ItemStatus::Removed {
        return Err(AppError::Validation(format!(
            "{} {item_id} is in the trash",
            kind.label()
        )));
    }

    let member = tx
        .lock_member(owner, member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", member_id))?;

    if kind == CatalogKind::Reward && member.points < i64::from(item.points) {
        return Err(AppError::InsufficientPoints {
            balance: member.points,
            cost: item.points,
        });
    }

    let delta = kind.event_delta(item.points);
    let member = tx.adjust_points(member.id, delta).await?;
    let record = tx
        .record_link_event(kind, member.id, item.id, Utc::now())
        .await?;
    tx.commit().await?;

    info!(
        "Member {} used {} {} ({delta:+} points, count {})",
        member.id,
        kind.label(),
        item.id,
        record.count
    );
    Ok(EventReceipt {
        member: member.into(),
        record,
    })
}

/// Credits the chore's points to the member and records the claim.
/// Points accrue on every claim, not just the first.
pub async fn claim_chore(
    store: &dyn LedgerStore,
    owner: &str,
    chore_id: i64,
    member_id: i64,
) -> Result<EventReceipt, AppError> {
    record_event(store, owner, CatalogKind::Chore, chore_id, member_id).await
}

/// Debits the reward's cost from the member and records the redemption.
/// Fails with `InsufficientPoints` when the balance does not cover the cost.
pub async fn redeem_reward(
    store: &dyn LedgerStore,
    owner: &str,
    reward_id: i64,
    member_id: i64,
) -> Result<EventReceipt, AppError> {
    record_event(store, owner, CatalogKind::Reward, reward_id, member_id).await
}
