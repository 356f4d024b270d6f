use axum::{extract::State, http::StatusCode, Extension, Json};
use uuid::Uuid;

use crate::auth::Owner;
use crate::errors::AppError;
use crate::extract::{JsonBody, PathParams};
use crate::ledger::catalog::{
    self, EventReceipt, EventRequest, ItemInput, PurgeReport, RelationCheck,
};
use crate::ledger::members::{self, DeductionInput, MemberInput};
use crate::ledger::views::{CatalogItemView, MemberView};
use crate::models::catalog::{CatalogKind, ItemStatus};
use crate::state::AppState;

// ── members ────────────────────────────────────────────────────────────────

/// GET /api/v1/members
pub async fn handle_list_members(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<Json<Vec<MemberView>>, AppError> {
    Ok(Json(members::list_members(state.store.as_ref(), owner.id()).await?))
}

/// POST /api/v1/members
pub async fn handle_create_member(
    State(state): State<AppState>,
    owner: Owner,
    JsonBody(req): JsonBody<MemberInput>,
) -> Result<(StatusCode, Json<MemberView>), AppError> {
    let member = members::create_member(state.store.as_ref(), owner.id(), req).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// GET /api/v1/members/:id
pub async fn handle_get_member(
    State(state): State<AppState>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<Json<MemberView>, AppError> {
    Ok(Json(members::get_member(state.store.as_ref(), owner.id(), id).await?))
}

/// PATCH /api/v1/members/:id
pub async fn handle_edit_member(
    State(state): State<AppState>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
    JsonBody(req): JsonBody<MemberInput>,
) -> Result<Json<MemberView>, AppError> {
    Ok(Json(
        members::edit_member(state.store.as_ref(), owner.id(), id, req).await?,
    ))
}

/// DELETE /api/v1/members/:id
pub async fn handle_delete_member(
    State(state): State<AppState>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<StatusCode, AppError> {
    members::delete_member(state.store.as_ref(), owner.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/members/:id/deductions
pub async fn handle_deduct_points(
    State(state): State<AppState>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
    JsonBody(req): JsonBody<DeductionInput>,
) -> Result<Json<MemberView>, AppError> {
    Ok(Json(
        members::deduct_points(state.store.as_ref(), owner.id(), id, req).await?,
    ))
}

/// DELETE /api/v1/members/:id/deductions/:deduction_id
pub async fn handle_delete_deduction(
    State(state): State<AppState>,
    owner: Owner,
    PathParams((id, deduction_id)): PathParams<(i64, Uuid)>,
) -> Result<Json<MemberView>, AppError> {
    Ok(Json(
        members::delete_deduction(state.store.as_ref(), owner.id(), id, deduction_id).await?,
    ))
}

/// DELETE /api/v1/members/:id/chores/:item_id
/// DELETE /api/v1/members/:id/rewards/:item_id
pub async fn handle_unlink_item(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams((id, item_id)): PathParams<(i64, i64)>,
) -> Result<Json<MemberView>, AppError> {
    Ok(Json(
        members::unlink_item(state.store.as_ref(), owner.id(), kind, id, item_id).await?,
    ))
}

// ── chores & rewards ───────────────────────────────────────────────────────

/// GET /api/v1/{chores,rewards}
pub async fn handle_list_active(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
) -> Result<Json<Vec<CatalogItemView>>, AppError> {
    Ok(Json(
        catalog::list_items(state.store.as_ref(), owner.id(), kind, ItemStatus::Active).await?,
    ))
}

/// GET /api/v1/{chores,rewards}/removed
pub async fn handle_list_removed(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
) -> Result<Json<Vec<CatalogItemView>>, AppError> {
    Ok(Json(
        catalog::list_items(state.store.as_ref(), owner.id(), kind, ItemStatus::Removed).await?,
    ))
}

/// POST /api/v1/{chores,rewards}
pub async fn handle_add_item(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    JsonBody(req): JsonBody<ItemInput>,
) -> Result<(StatusCode, Json<CatalogItemView>), AppError> {
    let item = catalog::add_item(state.store.as_ref(), owner.id(), kind, req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /api/v1/{chores,rewards}/:id
pub async fn handle_edit_item(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
    JsonBody(req): JsonBody<ItemInput>,
) -> Result<Json<CatalogItemView>, AppError> {
    Ok(Json(
        catalog::edit_item(state.store.as_ref(), owner.id(), kind, id, req).await?,
    ))
}

/// DELETE /api/v1/{chores,rewards}/:id (moves the item to the trash)
pub async fn handle_soft_delete(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<Json<CatalogItemView>, AppError> {
    Ok(Json(
        catalog::soft_delete(state.store.as_ref(), owner.id(), kind, id).await?,
    ))
}

/// POST /api/v1/{chores,rewards}/:id/restore
pub async fn handle_restore(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<Json<CatalogItemView>, AppError> {
    Ok(Json(
        catalog::restore(state.store.as_ref(), owner.id(), kind, id).await?,
    ))
}

/// GET /api/v1/{chores,rewards}/:id/relation
pub async fn handle_check_relation(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<Json<RelationCheck>, AppError> {
    Ok(Json(
        catalog::check_relation(state.store.as_ref(), owner.id(), kind, id).await?,
    ))
}

/// DELETE /api/v1/{chores,rewards}/:id/permanent
pub async fn handle_delete_permanently(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
) -> Result<Json<PurgeReport>, AppError> {
    Ok(Json(
        catalog::delete_permanently(state.store.as_ref(), owner.id(), kind, id).await?,
    ))
}

/// POST /api/v1/chores/:id/claim
/// POST /api/v1/rewards/:id/redeem
pub async fn handle_use_item(
    State(state): State<AppState>,
    Extension(kind): Extension<CatalogKind>,
    owner: Owner,
    PathParams(id): PathParams<i64>,
    JsonBody(req): JsonBody<EventRequest>,
) -> Result<Json<EventReceipt>, AppError> {
    let store = state.store.as_ref();
    let receipt = match kind {
        CatalogKind::Chore => catalog::claim_chore(store, owner.id(), id, req.member_id).await?,
        CatalogKind::Reward => catalog::redeem_reward(store, owner.id(), id, req.member_id).await?,
    };
    Ok(Json(receipt))
}
