use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    app_state::AppState,
    auth::Caller,
    cards,
    db::models::{Card, Page},
    error::AppError,
};

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub user_id: i64,
}

/// POST /cards (admin)
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<Card>), AppError> {
    let card = cards::create_card(
        &state.pool,
        &state.pan_key,
        &state.config.card_bin,
        &caller,
        req.user_id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(card)))
}

/// GET /cards/{id} (owner or admin)
pub async fn get_by_id(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
) -> Result<Json<Card>, AppError> {
    let card = cards::get_card(&state.pool, &caller, card_id).await?;
    Ok(Json(card))
}

#[derive(Debug, Serialize)]
pub struct MaskedNumberResponse {
    pub card_id: i64,
    pub masked_pan: String,
}

/// GET /cards/{id}/number (owner or admin)
pub async fn masked_number(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
) -> Result<Json<MaskedNumberResponse>, AppError> {
    let masked_pan = cards::masked_number(&state.pool, &caller, card_id).await?;
    Ok(Json(MaskedNumberResponse { card_id, masked_pan }))
}

#[derive(Debug, Deserialize)]
pub struct ListCardsQuery {
    pub user_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /cards?user_id=&page=&per_page=
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListCardsQuery>,
) -> Result<Json<Page<Card>>, AppError> {
    let page = cards::list_cards(&state.pool, &caller, params.user_id, params.page, params.per_page)
        .await?;
    Ok(Json(page))
}

/// POST /cards/{id}/block (admin)
pub async fn block(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
) -> Result<Json<Card>, AppError> {
    let card = cards::block_card(&state.pool, &caller, card_id).await?;
    Ok(Json(card))
}

/// POST /cards/{id}/unblock (admin)
pub async fn unblock(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
) -> Result<Json<Card>, AppError> {
    let card = cards::unblock_card(&state.pool, &caller, card_id).await?;
    Ok(Json(card))
}

/// DELETE /cards/{id} (admin)
pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    cards::delete_card(&state.pool, &caller, card_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

/// POST /cards/{id}/deposit (owner or admin)
pub async fn deposit(
    State(state): State<AppState>,
    caller: Caller,
    Path(card_id): Path<i64>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<Card>, AppError> {
    let card = cards::deposit(&state.pool, &caller, card_id, req.amount).await?;
    Ok(Json(card))
}
