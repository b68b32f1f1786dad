use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::{app_state::AppState, error::AppError, users};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: String,
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = users::register(&state.pool, &req.username, &req.password).await?;

    let body = UserSummary {
        id: user.id,
        username: user.username,
        role: user.role_name,
    };

    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = users::login(&state.pool, &state.tokens, &req.username, &req.password).await?;
    Ok(Json(TokenResponse { token }))
}
