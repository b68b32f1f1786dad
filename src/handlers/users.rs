use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{app_state::AppState, auth::Caller, error::AppError, users};

/// POST /users/{id}/disable (admin)
pub async fn disable(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    users::set_enabled(&state.pool, &caller, user_id, false).await?;
    Ok(Json(json!({ "status": "OK" })))
}

/// POST /users/{id}/enable (admin)
pub async fn enable(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    users::set_enabled(&state.pool, &caller, user_id, true).await?;
    Ok(Json(json!({ "status": "OK" })))
}
