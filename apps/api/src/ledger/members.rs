//! Member ledger: member records, balances, and the deduction history.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::ledger::validation::{deduction_points, initial_points, require_text};
use crate::ledger::views::{LedgerSnapshot, MemberView};
use crate::models::catalog::CatalogKind;
use crate::models::member::{MemberChanges, NewDeduction, NewMember};
use crate::store::{LedgerStore, LedgerTx, TxMode};

#[derive(Debug, Deserialize)]
pub struct MemberInput {
    pub name: String,
    /// Relationship label. Omitted on edit keeps the stored value.
    #[serde(default)]
    pub role: Option<String>,
    /// Initial allotment; only honoured on create.
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeductionInput {
    pub points: i64,
    pub reason: String,
}

/// Renders one member from a snapshot read inside the caller's transaction.
async fn member_view(
    tx: &mut dyn LedgerTx,
    owner: &str,
    id: i64,
) -> Result<MemberView, AppError> {
    LedgerSnapshot::load(tx, owner)
        .await?
        .into_member_views()
        .into_iter()
        .find(|m| m.id == id)
        .ok_or_else(|| AppError::not_found("Member", id))
}

pub async fn list_members(store: &dyn LedgerStore, owner: &str) -> Result<Vec<MemberView>, AppError> {
    let mut tx = store.begin(TxMode::Snapshot).await?;
    let snapshot = LedgerSnapshot::load(tx.as_mut(), owner).await?;
    tx.commit().await?;
    Ok(snapshot.into_member_views())
}

pub async fn get_member(
    store: &dyn LedgerStore,
    owner: &str,
    id: i64,
) -> Result<MemberView, AppError> {
    let mut tx = store.begin(TxMode::Snapshot).await?;
    let view = member_view(tx.as_mut(), owner, id).await?;
    tx.commit().await?;
    Ok(view)
}

pub async fn create_member(
    store: &dyn LedgerStore,
    owner: &str,
    input: MemberInput,
) -> Result<MemberView, AppError> {
    let new = NewMember {
        name: require_text("name", &input.name)?,
        role: input.role.as_deref().unwrap_or_default().trim().to_string(),
        points: initial_points(input.points)?,
    };

    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let row = tx.insert_member(owner, &new).await?;
    let view = member_view(tx.as_mut(), owner, row.id).await?;
    tx.commit().await?;

    info!("Created member {} for {owner}", row.id);
    Ok(view)
}

/// Renames a member or changes their role. Points are never edited directly.
pub async fn edit_member(
    store: &dyn LedgerStore,
    owner: &str,
    id: i64,
    input: MemberInput,
) -> Result<MemberView, AppError> {
    let changes = MemberChanges {
        name: require_text("name", &input.name)?,
        role: input.role.map(|r| r.trim().to_string()),
    };

    let mut tx = store.begin(TxMode::ReadWrite).await?;
    tx.update_member(owner, id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found("Member", id))?;
    let view = member_view(tx.as_mut(), owner, id).await?;
    tx.commit().await?;
    Ok(view)
}

/// Hard delete. The member's claim/redemption records and deductions go with it.
pub async fn delete_member(store: &dyn LedgerStore, owner: &str, id: i64) -> Result<(), AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;
    if !tx.delete_member(owner, id).await? {
        return Err(AppError::not_found("Member", id));
    }
    tx.commit().await?;
    info!("Deleted member {id} for {owner}");
    Ok(())
}

/// Records a deduction and subtracts it from the balance. No floor: the balance may go negative.
pub async fn deduct_points(
    store: &dyn LedgerStore,
    owner: &str,
    id: i64,
    input: DeductionInput,
) -> Result<MemberView, AppError> {
    let new = NewDeduction {
        id: Uuid::new_v4(),
        reason: require_text("reason", &input.reason)?,
        points: deduction_points(input.points)?,
        created_at: Utc::now(),
    };

    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let member = tx
        .lock_member(owner, id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", id))?;
    tx.insert_deduction(member.id, &new).await?;
    let member = tx.adjust_points(member.id, -new.points).await?;
    let view = member_view(tx.as_mut(), owner, id).await?;
    tx.commit().await?;

    info!(
        "Deducted {} points from member {id} ({}); balance now {}",
        new.points, new.reason, member.points
    );
    Ok(view)
}

/// Removes a deduction and gives its points back.
pub async fn delete_deduction(
    store: &dyn LedgerStore,
    owner: &str,
    member_id: i64,
    deduction_id: Uuid,
) -> Result<MemberView, AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let member = tx
        .lock_member(owner, member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", member_id))?;
    let deduction = tx
        .take_deduction(member.id, deduction_id)
        .await?
        .ok_or_else(|| AppError::not_found("Deduction", deduction_id))?;
    tx.adjust_points(member.id, deduction.points).await?;
    let view = member_view(tx.as_mut(), owner, member_id).await?;
    tx.commit().await?;

    info!(
        "Reversed deduction {deduction_id} ({} points) for member {member_id}",
        deduction.points
    );
    Ok(view)
}

/// Drops one member↔item association and reverses the points it moved,
/// so the balance stays consistent with the remaining records.
pub async fn unlink_item(
    store: &dyn LedgerStore,
    owner: &str,
    kind: CatalogKind,
    member_id: i64,
    item_id: i64,
) -> Result<MemberView, AppError> {
    let mut tx = store.begin(TxMode::ReadWrite).await?;
    let item = tx
        .lock_item(owner, kind, item_id)
        .await?
        .ok_or_else(|| AppError::not_found(kind.label(), item_id))?;
    let member = tx
        .lock_member(owner, member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", member_id))?;
    let link = tx
        .remove_link(kind, member.id, item.id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Member {member_id} has no {} record for {item_id}",
                kind.label()
            ))
        })?;
    let delta = kind.reversal_delta(item.points, link.count);
    tx.adjust_points(member.id, delta).await?;
    let view = member_view(tx.as_mut(), owner, member_id).await?;
    tx.commit().await?;

    info!(
        "Unlinked {} {item_id} from member {member_id} ({delta:+} points)",
        kind.label()
    );
    Ok(view)
}
