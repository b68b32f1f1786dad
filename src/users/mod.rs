use sqlx::{Pool, Sqlite};

use crate::{
    auth::{self, Caller, TokenService},
    db::{models::User, queries},
    error::AppError,
    validation,
};

/// Registers a new card holder with the default role.
pub async fn register(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    validation::validate_credentials(username, password)?;

    if queries::get_user_by_username(pool, username).await?.is_some() {
        tracing::warn!(username, "registration rejected: username taken");
        return Err(AppError::InvalidArgument(format!(
            "user already exists: {}",
            username
        )));
    }

    let hash = auth::hash_password(password);
    let user_id = queries::insert_user(pool, username, &hash, auth::ROLE_USER).await?;

    let user = queries::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user vanished after insert"))?;

    tracing::info!(username, user_id, "registered user");
    Ok(user)
}

/// Verifies credentials and issues a bearer token.
pub async fn login(
    pool: &Pool<Sqlite>,
    tokens: &TokenService,
    username: &str,
    password: &str,
) -> Result<String, AppError> {
    let bad_credentials = || AppError::Unauthorized("invalid username or password".into());

    let user = queries::get_user_by_username(pool, username)
        .await?
        .filter(|u| u.enabled)
        .ok_or_else(bad_credentials)?;

    if !auth::verify_password(password, &user.password_hash) {
        return Err(bad_credentials());
    }

    tokens.issue(&user.username, &user.role_name)
}

pub async fn set_enabled(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    user_id: i64,
    enabled: bool,
) -> Result<(), AppError> {
    caller.require_admin()?;

    if !queries::set_user_enabled(pool, user_id, enabled).await? {
        return Err(AppError::NotFound(format!("user not found: {}", user_id)));
    }

    tracing::info!(user_id, enabled, admin = %caller.username, "updated user enabled flag");
    Ok(())
}
