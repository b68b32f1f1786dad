//! Shared fixtures for service tests.

use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};

use crate::{
    auth::{self, Caller},
    cards,
    crypto::AesKey,
    db::{models::Card, queries},
};

pub fn pan_key() -> AesKey {
    AesKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
}

pub async fn create_user(pool: &Pool<Sqlite>, username: &str, role: &str) -> Caller {
    let hash = auth::hash_password("test-password");
    let user_id = queries::insert_user(pool, username, &hash, role).await.unwrap();
    Caller {
        user_id,
        username: username.to_string(),
        role: role.to_string(),
    }
}

pub async fn admin(pool: &Pool<Sqlite>) -> Caller {
    create_user(pool, "root", auth::ROLE_ADMIN).await
}

pub async fn issue_card(pool: &Pool<Sqlite>, admin: &Caller, user_id: i64) -> Card {
    cards::create_card(pool, &pan_key(), "4400", admin, user_id)
        .await
        .unwrap()
}

pub async fn set_balance(pool: &Pool<Sqlite>, card_id: i64, balance: Decimal) {
    sqlx::query("UPDATE cards SET balance = ? WHERE id = ?")
        .bind(balance.to_string())
        .bind(card_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn set_expiry(pool: &Pool<Sqlite>, card_id: i64, exp_month: u32, exp_year: i32) {
    sqlx::query("UPDATE cards SET exp_month = ?, exp_year = ? WHERE id = ?")
        .bind(exp_month)
        .bind(exp_year)
        .bind(card_id)
        .execute(pool)
        .await
        .unwrap();
}
