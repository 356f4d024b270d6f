//! Persistence gateway: the only path from the ledger services to stored rows.
//!
//! Every service operation opens a [`LedgerTx`], performs its reads and writes
//! through it, and commits. Dropping a transaction without committing rolls it
//! back, so a multi-step mutation (claim, redeem, permanent delete) is visible
//! either completely or not at all.
//!
//! Backends: `PgStore` (PostgreSQL via sqlx) and `MemoryStore` (process-local,
//! used when no database is configured and by the test suite).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::catalog::{
    AssociationRow, CatalogItemRow, CatalogKind, ItemChanges, ItemStatus, NewItem,
};
use crate::models::member::{DeductionRow, MemberChanges, MemberRow, NewDeduction, NewMember};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads and writes.
    ReadWrite,
    /// Read-only, every statement sees the same snapshot.
    Snapshot,
}

/// Opens transactions against a backend. Carried in `AppState` as `Arc<dyn LedgerStore>`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn LedgerTx>, AppError>;

    fn backend(&self) -> &'static str;
}

/// One open transaction. All owner-facing lookups are scoped by `owner`; the
/// id-only mutations assume the caller already resolved the row through an
/// owner-scoped lookup in the same transaction.
#[async_trait]
pub trait LedgerTx: Send {
    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    // ── members ────────────────────────────────────────────────────────────

    async fn list_members(&mut self, owner: &str) -> Result<Vec<MemberRow>, AppError>;

    async fn find_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError>;

    /// Like `find_member`, but holds a row lock until the transaction ends.
    async fn lock_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError>;

    async fn insert_member(&mut self, owner: &str, new: &NewMember) -> Result<MemberRow, AppError>;

    async fn update_member(
        &mut self,
        owner: &str,
        id: i64,
        changes: &MemberChanges,
    ) -> Result<Option<MemberRow>, AppError>;

    /// Deletes the member together with its association rows and deductions.
    async fn delete_member(&mut self, owner: &str, id: i64) -> Result<bool, AppError>;

    /// Adds `delta` to the member's balance and returns the updated row.
    async fn adjust_points(&mut self, member_id: i64, delta: i64) -> Result<MemberRow, AppError>;

    // ── deductions ─────────────────────────────────────────────────────────

    /// All deductions of the owner's members, oldest first.
    async fn list_deductions(&mut self, owner: &str) -> Result<Vec<DeductionRow>, AppError>;

    async fn insert_deduction(
        &mut self,
        member_id: i64,
        new: &NewDeduction,
    ) -> Result<DeductionRow, AppError>;

    /// Deletes one deduction of the member, returning it if it existed.
    async fn take_deduction(
        &mut self,
        member_id: i64,
        deduction_id: Uuid,
    ) -> Result<Option<DeductionRow>, AppError>;

    // ── catalog items ──────────────────────────────────────────────────────

    async fn list_items(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        status: Option<ItemStatus>,
    ) -> Result<Vec<CatalogItemRow>, AppError>;

    async fn find_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError>;

    /// Like `find_item`, but holds a row lock until the transaction ends.
    async fn lock_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError>;

    async fn insert_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        new: &NewItem,
    ) -> Result<CatalogItemRow, AppError>;

    async fn update_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        changes: &ItemChanges,
    ) -> Result<Option<CatalogItemRow>, AppError>;

    async fn set_item_status(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        status: ItemStatus,
    ) -> Result<Option<CatalogItemRow>, AppError>;

    async fn delete_item(&mut self, owner: &str, kind: CatalogKind, id: i64)
        -> Result<bool, AppError>;

    // ── associations ───────────────────────────────────────────────────────

    /// Every association of the given kind whose member belongs to `owner`.
    async fn list_links(
        &mut self,
        owner: &str,
        kind: CatalogKind,
    ) -> Result<Vec<AssociationRow>, AppError>;

    async fn has_links(&mut self, kind: CatalogKind, item_id: i64) -> Result<bool, AppError>;

    /// Atomic upsert: inserts `count = 1, date = [at]` or bumps the count and appends `at`.
    async fn record_link_event(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AssociationRow, AppError>;

    async fn remove_link(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
    ) -> Result<Option<AssociationRow>, AppError>;

    /// Deletes every association of an item, returning the removed rows.
    async fn remove_item_links(
        &mut self,
        kind: CatalogKind,
        item_id: i64,
    ) -> Result<Vec<AssociationRow>, AppError>;
}
