use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ledger::validation::apply_delta;
use crate::models::catalog::{
    AssociationRow, CatalogItemRow, CatalogKind, ItemChanges, ItemStatus, NewItem,
};
use crate::models::member::{DeductionRow, MemberChanges, MemberRow, NewDeduction, NewMember};
use crate::store::{LedgerStore, LedgerTx, TxMode};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_member_id: i64,
    next_chore_id: i64,
    next_reward_id: i64,
    members: BTreeMap<i64, MemberRow>,
    deductions: Vec<DeductionRow>,
    chores: BTreeMap<i64, CatalogItemRow>,
    rewards: BTreeMap<i64, CatalogItemRow>,
    chore_links: BTreeMap<(i64, i64), AssociationRow>,
    reward_links: BTreeMap<(i64, i64), AssociationRow>,
}

impl MemoryState {
    fn items(&self, kind: CatalogKind) -> &BTreeMap<i64, CatalogItemRow> {
        match kind {
            CatalogKind::Chore => &self.chores,
            CatalogKind::Reward => &self.rewards,
        }
    }

    fn items_mut(&mut self, kind: CatalogKind) -> &mut BTreeMap<i64, CatalogItemRow> {
        match kind {
            CatalogKind::Chore => &mut self.chores,
            CatalogKind::Reward => &mut self.rewards,
        }
    }

    fn links(&self, kind: CatalogKind) -> &BTreeMap<(i64, i64), AssociationRow> {
        match kind {
            CatalogKind::Chore => &self.chore_links,
            CatalogKind::Reward => &self.reward_links,
        }
    }

    fn links_mut(&mut self, kind: CatalogKind) -> &mut BTreeMap<(i64, i64), AssociationRow> {
        match kind {
            CatalogKind::Chore => &mut self.chore_links,
            CatalogKind::Reward => &mut self.reward_links,
        }
    }

    fn next_item_id(&mut self, kind: CatalogKind) -> i64 {
        let seq = match kind {
            CatalogKind::Chore => &mut self.next_chore_id,
            CatalogKind::Reward => &mut self.next_reward_id,
        };
        *seq += 1;
        *seq
    }

    fn owns_member(&self, owner: &str, member_id: i64) -> bool {
        self.members
            .get(&member_id)
            .is_some_and(|m| m.user_id == owner)
    }

    fn owned_item_mut(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Option<&mut CatalogItemRow> {
        self.items_mut(kind)
            .get_mut(&id)
            .filter(|item| item.user_id == owner)
    }
}

/// Process-local backend. A transaction holds the store lock for its whole
/// lifetime and works on a copy of the state that replaces the original only
/// on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self, _mode: TxMode) -> Result<Box<dyn LedgerTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn list_members(&mut self, owner: &str) -> Result<Vec<MemberRow>, AppError> {
        Ok(self
            .work
            .members
            .values()
            .filter(|m| m.user_id == owner)
            .cloned()
            .collect())
    }

    async fn find_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError> {
        Ok(self
            .work
            .members
            .get(&id)
            .filter(|m| m.user_id == owner)
            .cloned())
    }

    async fn lock_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError> {
        self.find_member(owner, id).await
    }

    async fn insert_member(&mut self, owner: &str, new: &NewMember) -> Result<MemberRow, AppError> {
        self.work.next_member_id += 1;
        let row = MemberRow {
            id: self.work.next_member_id,
            user_id: owner.to_string(),
            name: new.name.clone(),
            role: new.role.clone(),
            points: new.points,
            created_at: Utc::now(),
        };
        self.work.members.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_member(
        &mut self,
        owner: &str,
        id: i64,
        changes: &MemberChanges,
    ) -> Result<Option<MemberRow>, AppError> {
        let Some(member) = self
            .work
            .members
            .get_mut(&id)
            .filter(|m| m.user_id == owner)
        else {
            return Ok(None);
        };
        member.name = changes.name.clone();
        if let Some(role) = &changes.role {
            member.role = role.clone();
        }
        Ok(Some(member.clone()))
    }

    async fn delete_member(&mut self, owner: &str, id: i64) -> Result<bool, AppError> {
        if !self.work.owns_member(owner, id) {
            return Ok(false);
        }
        self.work.members.remove(&id);
        self.work.deductions.retain(|d| d.member_id != id);
        self.work.chore_links.retain(|(member_id, _), _| *member_id != id);
        self.work.reward_links.retain(|(member_id, _), _| *member_id != id);
        Ok(true)
    }

    async fn adjust_points(&mut self, member_id: i64, delta: i64) -> Result<MemberRow, AppError> {
        let member = self
            .work
            .members
            .get_mut(&member_id)
            .ok_or_else(|| AppError::not_found("Member", member_id))?;
        member.points = apply_delta(member.points, delta)?;
        Ok(member.clone())
    }

    async fn list_deductions(&mut self, owner: &str) -> Result<Vec<DeductionRow>, AppError> {
        let work = &self.work;
        Ok(work
            .deductions
            .iter()
            .filter(|d| work.owns_member(owner, d.member_id))
            .cloned()
            .collect())
    }

    async fn insert_deduction(
        &mut self,
        member_id: i64,
        new: &NewDeduction,
    ) -> Result<DeductionRow, AppError> {
        let row = DeductionRow {
            id: new.id,
            member_id,
            reason: new.reason.clone(),
            points: new.points,
            created_at: new.created_at,
        };
        self.work.deductions.push(row.clone());
        Ok(row)
    }

    async fn take_deduction(
        &mut self,
        member_id: i64,
        deduction_id: Uuid,
    ) -> Result<Option<DeductionRow>, AppError> {
        let position = self
            .work
            .deductions
            .iter()
            .position(|d| d.id == deduction_id && d.member_id == member_id);
        Ok(position.map(|i| self.work.deductions.remove(i)))
    }

    async fn list_items(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        status: Option<ItemStatus>,
    ) -> Result<Vec<CatalogItemRow>, AppError> {
        Ok(self
            .work
            .items(kind)
            .values()
            .filter(|item| item.user_id == owner)
            .filter(|item| status.map_or(true, |s| item.status == s))
            .cloned()
            .collect())
    }

    async fn find_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        Ok(self
            .work
            .items(kind)
            .get(&id)
            .filter(|item| item.user_id == owner)
            .cloned())
    }

    async fn lock_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        self.find_item(owner, kind, id).await
    }

    async fn insert_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        new: &NewItem,
    ) -> Result<CatalogItemRow, AppError> {
        let id = self.work.next_item_id(kind);
        let row = CatalogItemRow {
            id,
            user_id: owner.to_string(),
            name: new.name.clone(),
            description: match kind {
                CatalogKind::Chore => String::new(),
                CatalogKind::Reward => new.description.clone(),
            },
            points: new.points,
            status: ItemStatus::Active,
            created_at: Utc::now(),
        };
        self.work.items_mut(kind).insert(id, row.clone());
        Ok(row)
    }

    async fn update_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        changes: &ItemChanges,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let Some(item) = self.work.owned_item_mut(owner, kind, id) else {
            return Ok(None);
        };
        item.name = changes.name.clone();
        item.points = changes.points;
        if let (CatalogKind::Reward, Some(description)) = (kind, &changes.description) {
            item.description = description.clone();
        }
        Ok(Some(item.clone()))
    }

    async fn set_item_status(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        status: ItemStatus,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let Some(item) = self.work.owned_item_mut(owner, kind, id) else {
            return Ok(None);
        };
        item.status = status;
        Ok(Some(item.clone()))
    }

    async fn delete_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<bool, AppError> {
        if self.work.owned_item_mut(owner, kind, id).is_none() {
            return Ok(false);
        }
        self.work.items_mut(kind).remove(&id);
        self.work
            .links_mut(kind)
            .retain(|(_, item_id), _| *item_id != id);
        Ok(true)
    }

    async fn list_links(
        &mut self,
        owner: &str,
        kind: CatalogKind,
    ) -> Result<Vec<AssociationRow>, AppError> {
        let work = &self.work;
        Ok(work
            .links(kind)
            .values()
            .filter(|link| work.owns_member(owner, link.member_id))
            .cloned()
            .collect())
    }

    async fn has_links(&mut self, kind: CatalogKind, item_id: i64) -> Result<bool, AppError> {
        Ok(self
            .work
            .links(kind)
            .keys()
            .any(|(_, linked)| *linked == item_id))
    }

    async fn record_link_event(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AssociationRow, AppError> {
        let link = self
            .work
            .links_mut(kind)
            .entry((member_id, item_id))
            .or_insert_with(|| AssociationRow {
                member_id,
                item_id,
                count: 0,
                date: Vec::new(),
            });
        link.count += 1;
        link.date.push(at);
        Ok(link.clone())
    }

    async fn remove_link(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
    ) -> Result<Option<AssociationRow>, AppError> {
        Ok(self.work.links_mut(kind).remove(&(member_id, item_id)))
    }

    async fn remove_item_links(
        &mut self,
        kind: CatalogKind,
        item_id: i64,
    ) -> Result<Vec<AssociationRow>, AppError> {
        let links = self.work.links_mut(kind);
        let keys: Vec<(i64, i64)> = links
            .keys()
            .filter(|(_, linked)| *linked == item_id)
            .copied()
            .collect();
        Ok(keys.iter().filter_map(|key| links.remove(key)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewMember {
        NewMember {
            name: "Alice".to_string(),
            role: "daughter".to_string(),
            points: 0,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = MemoryStore::new();

        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        let member = tx.insert_member("owner-1", &alice()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        tx.adjust_points(member.id, 500).await.unwrap();
        drop(tx);

        let mut tx = store.begin(TxMode::Snapshot).await.unwrap();
        let reloaded = tx.find_member("owner-1", member.id).await.unwrap().unwrap();
        assert_eq!(reloaded.points, 0);
    }

    #[tokio::test]
    async fn test_link_event_upserts_count_and_dates() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        let member = tx.insert_member("owner-1", &alice()).await.unwrap();

        let first = tx
            .record_link_event(CatalogKind::Chore, member.id, 7, Utc::now())
            .await
            .unwrap();
        let second = tx
            .record_link_event(CatalogKind::Chore, member.id, 7, Utc::now())
            .await
            .unwrap();

        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert_eq!(second.date.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_member_cascades_links_and_deductions() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        let member = tx.insert_member("owner-1", &alice()).await.unwrap();
        tx.record_link_event(CatalogKind::Reward, member.id, 3, Utc::now())
            .await
            .unwrap();
        tx.insert_deduction(
            member.id,
            &NewDeduction {
                id: Uuid::new_v4(),
                reason: "late".to_string(),
                points: 5,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        assert!(tx.delete_member("owner-1", member.id).await.unwrap());
        assert!(!tx.has_links(CatalogKind::Reward, 3).await.unwrap());
        assert!(tx.list_deductions("owner-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_points_refuses_overflow_and_keeps_balance() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        let rich = NewMember {
            points: i64::MAX,
            ..alice()
        };
        let member = tx.insert_member("owner-1", &rich).await.unwrap();

        let err = tx.adjust_points(member.id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let reloaded = tx.find_member("owner-1", member.id).await.unwrap().unwrap();
        assert_eq!(reloaded.points, i64::MAX);
    }

    #[tokio::test]
    async fn test_rows_are_scoped_by_owner() {
        let store = MemoryStore::new();
        let mut tx = store.begin(TxMode::ReadWrite).await.unwrap();
        let member = tx.insert_member("owner-1", &alice()).await.unwrap();

        assert!(tx.find_member("owner-2", member.id).await.unwrap().is_none());
        assert!(tx.list_members("owner-2").await.unwrap().is_empty());
        assert!(!tx.delete_member("owner-2", member.id).await.unwrap());
    }
}
