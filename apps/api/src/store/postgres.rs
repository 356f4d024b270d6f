use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::catalog::{
    AssociationRow, CatalogItemRow, CatalogKind, ItemChanges, ItemStatus, NewItem,
};
use crate::models::member::{DeductionRow, MemberChanges, MemberRow, NewDeduction, NewMember};
use crate::store::{LedgerStore, LedgerTx, TxMode};

const MEMBER_COLUMNS: &str = "id, user_id, name, role, points, created_at";

/// Table and column names backing one catalog kind. Never user input, so they
/// are safe to splice into query text.
struct Tables {
    item: &'static str,
    link: &'static str,
    fk: &'static str,
    description: &'static str,
}

fn tables(kind: CatalogKind) -> Tables {
    match kind {
        CatalogKind::Chore => Tables {
            item: "chore",
            link: "member_chore",
            fk: "chore_id",
            description: "''::text",
        },
        CatalogKind::Reward => Tables {
            item: "reward",
            link: "member_reward",
            fk: "reward_id",
            description: "description",
        },
    }
}

impl Tables {
    fn item_columns(&self) -> String {
        format!(
            "id, user_id, name, {} AS description, points, status, created_at",
            self.description
        )
    }

    fn link_columns(&self) -> String {
        format!("member_id, {} AS item_id, count, date", self.fk)
    }
}

/// SQLSTATE 22003 (numeric_value_out_of_range) on a balance update is bad input,
/// not a server fault.
fn out_of_range_as_validation(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("22003") => {
            AppError::Validation("balance would be out of range".to_string())
        }
        _ => AppError::Database(err),
    }
}

/// PostgreSQL backend. Each `LedgerTx` wraps one `sqlx::Transaction`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn LedgerTx>, AppError> {
        let mut tx = self.pool.begin().await?;
        if mode == TxMode::Snapshot {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                .execute(&mut *tx)
                .await?;
        }
        Ok(Box::new(PgTx { tx }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn list_members(&mut self, owner: &str) -> Result<Vec<MemberRow>, AppError> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE user_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, MemberRow>(&sql)
            .bind(owner)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn find_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1 AND user_id = $2");
        Ok(sqlx::query_as::<_, MemberRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_member(&mut self, owner: &str, id: i64) -> Result<Option<MemberRow>, AppError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1 AND user_id = $2 FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, MemberRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_member(&mut self, owner: &str, new: &NewMember) -> Result<MemberRow, AppError> {
        let sql = format!(
            "INSERT INTO members (user_id, name, role, points) VALUES ($1, $2, $3, $4) \
             RETURNING {MEMBER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, MemberRow>(&sql)
            .bind(owner)
            .bind(&new.name)
            .bind(&new.role)
            .bind(new.points)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn update_member(
        &mut self,
        owner: &str,
        id: i64,
        changes: &MemberChanges,
    ) -> Result<Option<MemberRow>, AppError> {
        let sql = format!(
            "UPDATE members SET name = $1, role = COALESCE($2, role) WHERE id = $3 AND user_id = $4 \
             RETURNING {MEMBER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, MemberRow>(&sql)
            .bind(&changes.name)
            .bind(changes.role.as_deref())
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn delete_member(&mut self, owner: &str, id: i64) -> Result<bool, AppError> {
        // member_chore, member_reward and member_deduction rows cascade
        let result = sqlx::query("DELETE FROM members WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_points(&mut self, member_id: i64, delta: i64) -> Result<MemberRow, AppError> {
        let sql = format!(
            "UPDATE members SET points = points + $1 WHERE id = $2 RETURNING {MEMBER_COLUMNS}"
        );
        debug!("Adjusting member {member_id} by {delta}");
        sqlx::query_as::<_, MemberRow>(&sql)
            .bind(delta)
            .bind(member_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(out_of_range_as_validation)?
            .ok_or_else(|| AppError::not_found("Member", member_id))
    }

    async fn list_deductions(&mut self, owner: &str) -> Result<Vec<DeductionRow>, AppError> {
        Ok(sqlx::query_as::<_, DeductionRow>(
            r#"
            SELECT d.id, d.member_id, d.reason, d.points, d.created_at
            FROM member_deduction d
            JOIN members m ON m.id = d.member_id
            WHERE m.user_id = $1
            ORDER BY d.created_at, d.id
            "#,
        )
        .bind(owner)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_deduction(
        &mut self,
        member_id: i64,
        new: &NewDeduction,
    ) -> Result<DeductionRow, AppError> {
        Ok(sqlx::query_as::<_, DeductionRow>(
            r#"
            INSERT INTO member_deduction (id, member_id, reason, points, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, member_id, reason, points, created_at
            "#,
        )
        .bind(new.id)
        .bind(member_id)
        .bind(&new.reason)
        .bind(new.points)
        .bind(new.created_at)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn take_deduction(
        &mut self,
        member_id: i64,
        deduction_id: Uuid,
    ) -> Result<Option<DeductionRow>, AppError> {
        Ok(sqlx::query_as::<_, DeductionRow>(
            r#"
            DELETE FROM member_deduction
            WHERE id = $1 AND member_id = $2
            RETURNING id, member_id, reason, points, created_at
            "#,
        )
        .bind(deduction_id)
        .bind(member_id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn list_items(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        status: Option<ItemStatus>,
    ) -> Result<Vec<CatalogItemRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1 AND ($2::item_status IS NULL OR status = $2) \
             ORDER BY id",
            t.item_columns(),
            t.item
        );
        Ok(sqlx::query_as::<_, CatalogItemRow>(&sql)
            .bind(owner)
            .bind(status)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn find_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND user_id = $2",
            t.item_columns(),
            t.item
        );
        Ok(sqlx::query_as::<_, CatalogItemRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND user_id = $2 FOR UPDATE",
            t.item_columns(),
            t.item
        );
        Ok(sqlx::query_as::<_, CatalogItemRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        new: &NewItem,
    ) -> Result<CatalogItemRow, AppError> {
        let t = tables(kind);
        let row = match kind {
            CatalogKind::Chore => {
                let sql = format!(
                    "INSERT INTO chore (user_id, name, points) VALUES ($1, $2, $3) RETURNING {}",
                    t.item_columns()
                );
                sqlx::query_as::<_, CatalogItemRow>(&sql)
                    .bind(owner)
                    .bind(&new.name)
                    .bind(new.points)
                    .fetch_one(&mut *self.tx)
                    .await?
            }
            CatalogKind::Reward => {
                let sql = format!(
                    "INSERT INTO reward (user_id, name, description, points) \
                     VALUES ($1, $2, $3, $4) RETURNING {}",
                    t.item_columns()
                );
                sqlx::query_as::<_, CatalogItemRow>(&sql)
                    .bind(owner)
                    .bind(&new.name)
                    .bind(&new.description)
                    .bind(new.points)
                    .fetch_one(&mut *self.tx)
                    .await?
            }
        };
        Ok(row)
    }

    async fn update_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        changes: &ItemChanges,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let t = tables(kind);
        let row = match kind {
            CatalogKind::Chore => {
                let sql = format!(
                    "UPDATE chore SET name = $1, points = $2 WHERE id = $3 AND user_id = $4 \
                     RETURNING {}",
                    t.item_columns()
                );
                sqlx::query_as::<_, CatalogItemRow>(&sql)
                    .bind(&changes.name)
                    .bind(changes.points)
                    .bind(id)
                    .bind(owner)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
            CatalogKind::Reward => {
                let sql = format!(
                    "UPDATE reward SET name = $1, points = $2, \
                     description = COALESCE($3, description) \
                     WHERE id = $4 AND user_id = $5 RETURNING {}",
                    t.item_columns()
                );
                sqlx::query_as::<_, CatalogItemRow>(&sql)
                    .bind(&changes.name)
                    .bind(changes.points)
                    .bind(changes.description.as_deref())
                    .bind(id)
                    .bind(owner)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
        };
        Ok(row)
    }

    async fn set_item_status(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
        status: ItemStatus,
    ) -> Result<Option<CatalogItemRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "UPDATE {} SET status = $1 WHERE id = $2 AND user_id = $3 RETURNING {}",
            t.item,
            t.item_columns()
        );
        Ok(sqlx::query_as::<_, CatalogItemRow>(&sql)
            .bind(status)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn delete_item(
        &mut self,
        owner: &str,
        kind: CatalogKind,
        id: i64,
    ) -> Result<bool, AppError> {
        let t = tables(kind);
        let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", t.item);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(owner)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_links(
        &mut self,
        owner: &str,
        kind: CatalogKind,
    ) -> Result<Vec<AssociationRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "SELECT l.member_id, l.{fk} AS item_id, l.count, l.date \
             FROM {link} l JOIN members m ON m.id = l.member_id \
             WHERE m.user_id = $1 ORDER BY l.member_id, l.{fk}",
            fk = t.fk,
            link = t.link
        );
        Ok(sqlx::query_as::<_, AssociationRow>(&sql)
            .bind(owner)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn has_links(&mut self, kind: CatalogKind, item_id: i64) -> Result<bool, AppError> {
        let t = tables(kind);
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            t.link, t.fk
        );
        Ok(sqlx::query_scalar::<_, bool>(&sql)
            .bind(item_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn record_link_event(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AssociationRow, AppError> {
        let t = tables(kind);
        // Single-statement upsert: concurrent events on the same pair serialize on the row.
        let sql = format!(
            "INSERT INTO {link} (member_id, {fk}, count, date) \
             VALUES ($1, $2, 1, ARRAY[$3::timestamptz]) \
             ON CONFLICT (member_id, {fk}) DO UPDATE \
             SET count = {link}.count + 1, date = array_append({link}.date, $3::timestamptz) \
             RETURNING {columns}",
            link = t.link,
            fk = t.fk,
            columns = t.link_columns()
        );
        Ok(sqlx::query_as::<_, AssociationRow>(&sql)
            .bind(member_id)
            .bind(item_id)
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn remove_link(
        &mut self,
        kind: CatalogKind,
        member_id: i64,
        item_id: i64,
    ) -> Result<Option<AssociationRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "DELETE FROM {} WHERE member_id = $1 AND {} = $2 RETURNING {}",
            t.link,
            t.fk,
            t.link_columns()
        );
        Ok(sqlx::query_as::<_, AssociationRow>(&sql)
            .bind(member_id)
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn remove_item_links(
        &mut self,
        kind: CatalogKind,
        item_id: i64,
    ) -> Result<Vec<AssociationRow>, AppError> {
        let t = tables(kind);
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1 RETURNING {}",
            t.link,
            t.fk,
            t.link_columns()
        );
        Ok(sqlx::query_as::<_, AssociationRow>(&sql)
            .bind(item_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chore_columns_synthesize_empty_description() {
        let cols = tables(CatalogKind::Chore).item_columns();
        assert!(cols.contains("''::text AS description"));
    }

    #[test]
    fn test_reward_link_columns_alias_item_id() {
        let cols = tables(CatalogKind::Reward).link_columns();
        assert_eq!(cols, "member_id, reward_id AS item_id, count, date");
    }
}
