use axum::{Json, extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{app_state::AppState, auth::Caller, error::AppError, transfers};

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_card_id: i64,
    pub to_card_id: i64,
    pub amount: Decimal,
}

/// POST /transfers (between the caller's own cards)
pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<TransferRequest>,
) -> Result<StatusCode, AppError> {
    transfers::transfer(
        &state.pool,
        req.from_card_id,
        req.to_card_id,
        req.amount,
        &caller.username,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
