use sqlx::{Pool, Sqlite};
use std::sync::Arc;

use crate::{auth::TokenService, config::Config, crypto::AesKey};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub pan_key: AesKey,
    pub tokens: Arc<TokenService>,
}
