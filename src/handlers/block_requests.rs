use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    app_state::AppState, auth::Caller, block_requests, db::models::BlockRequest, error::AppError,
};

#[derive(Debug, Deserialize)]
pub struct CreateBlockRequest {
    pub card_id: i64,
    pub comment: Option<String>,
}

/// POST /block-requests (card owner)
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateBlockRequest>,
) -> Result<Json<BlockRequest>, AppError> {
    let request =
        block_requests::create_request(&state.pool, &caller, req.card_id, req.comment.as_deref())
            .await?;

    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub comment: Option<String>,
}

/// POST /block-requests/{id}/approve (admin)
pub async fn approve(
    State(state): State<AppState>,
    caller: Caller,
    Path(request_id): Path<i64>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<BlockRequest>, AppError> {
    let request =
        block_requests::approve(&state.pool, &caller, request_id, req.comment.as_deref()).await?;
    Ok(Json(request))
}

/// POST /block-requests/{id}/reject (admin)
pub async fn reject(
    State(state): State<AppState>,
    caller: Caller,
    Path(request_id): Path<i64>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<BlockRequest>, AppError> {
    let request =
        block_requests::reject(&state.pool, &caller, request_id, req.comment.as_deref()).await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub card_id: i64,
}

/// GET /block-requests?card_id= (card owner or admin)
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<BlockRequest>>, AppError> {
    let requests = block_requests::list_by_card(&state.pool, &caller, params.card_id).await?;
    Ok(Json(requests))
}
