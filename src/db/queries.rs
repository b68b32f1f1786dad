use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite, Transaction};

use crate::db::models::{BlockRequest, BlockRequestStatus, Card, CardStatus, User};

const USER_COLUMNS: &str = "users.id, users.username, users.password_hash, \
     roles.name AS role_name, users.enabled, users.created_at";

pub async fn get_user_by_username(pool: &Pool<Sqlite>, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users JOIN roles ON roles.id = users.role_id \
         WHERE users.username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn get_user_by_id(pool: &Pool<Sqlite>, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users JOIN roles ON roles.id = users.role_id \
         WHERE users.id = ?"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn insert_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password_hash: &str,
    role_name: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO users (username, password_hash, role_id) \
         VALUES (?, ?, (SELECT id FROM roles WHERE name = ?))",
    )
    .bind(username)
    .bind(password_hash)
    .bind(role_name)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn set_user_enabled(pool: &Pool<Sqlite>, user_id: i64, enabled: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn pan_hash_exists(pool: &Pool<Sqlite>, pan_hash: &str) -> Result<bool> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards WHERE pan_hash = ?")
        .bind(pan_hash)
        .fetch_one(pool)
        .await?;

    Ok(row.0 > 0)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_card(
    pool: &Pool<Sqlite>,
    user_id: i64,
    pan_encrypted: &str,
    pan_hash: &str,
    pan_last4: &str,
    exp_month: u32,
    exp_year: i32,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO cards (user_id, pan_encrypted, pan_hash, pan_last4, exp_month, exp_year, \
         status, balance) VALUES (?, ?, ?, ?, ?, ?, 'ACTIVE', '0')",
    )
    .bind(user_id)
    .bind(pan_encrypted)
    .bind(pan_hash)
    .bind(pan_last4)
    .bind(exp_month)
    .bind(exp_year)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_card(pool: &Pool<Sqlite>, card_id: i64) -> Result<Option<Card>> {
    let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = ?")
        .bind(card_id)
        .fetch_optional(pool)
        .await?;

    Ok(card)
}

pub async fn list_cards_by_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
    limit: u32,
    offset: i64,
) -> Result<(Vec<Card>, i64)> {
    let cards = sqlx::query_as::<_, Card>(
        "SELECT * FROM cards WHERE user_id = ? ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok((cards, total.0))
}

pub async fn list_all_cards(
    pool: &Pool<Sqlite>,
    limit: u32,
    offset: i64,
) -> Result<(Vec<Card>, i64)> {
    let cards = sqlx::query_as::<_, Card>("SELECT * FROM cards ORDER BY id LIMIT ? OFFSET ?")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards")
        .fetch_one(pool)
        .await?;

    Ok((cards, total.0))
}

/// Acquires the write lock on a single card row before reading it. The touch
/// update forces the open transaction to hold the exclusive lock, so the row
/// returned is the one every precondition is validated against.
pub async fn lock_card(tx: &mut Transaction<'_, Sqlite>, card_id: i64) -> Result<Option<Card>> {
    sqlx::query("UPDATE cards SET id = id WHERE id = ?")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = ?")
        .bind(card_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(card)
}

/// Locks two card rows in ascending-id order, then reads both. The canonical
/// ordering keeps opposite-direction transfers over the same pair from
/// deadlocking each other. Returns fewer than two cards if any id is absent.
pub async fn lock_card_pair(
    tx: &mut Transaction<'_, Sqlite>,
    card_a: i64,
    card_b: i64,
) -> Result<Vec<Card>> {
    let (lo, hi) = if card_a <= card_b {
        (card_a, card_b)
    } else {
        (card_b, card_a)
    };

    for id in [lo, hi] {
        sqlx::query("UPDATE cards SET id = id WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    let cards = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id IN (?, ?) ORDER BY id")
        .bind(lo)
        .bind(hi)
        .fetch_all(&mut **tx)
        .await?;

    Ok(cards)
}

pub async fn update_card_status(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: i64,
    status: CardStatus,
) -> Result<()> {
    sqlx::query("UPDATE cards SET status = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(status.as_str())
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub async fn update_card_balance(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: i64,
    balance: Decimal,
) -> Result<()> {
    sqlx::query("UPDATE cards SET balance = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(balance.to_string())
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub async fn delete_card(tx: &mut Transaction<'_, Sqlite>, card_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM cards WHERE id = ?")
        .bind(card_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub async fn insert_transfer(
    tx: &mut Transaction<'_, Sqlite>,
    from_card_id: i64,
    to_card_id: i64,
    amount: Decimal,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO transfers (from_card_id, to_card_id, amount) VALUES (?, ?, ?)")
        .bind(from_card_id)
        .bind(to_card_id)
        .bind(amount.to_string())
        .execute(&mut **tx)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_block_request(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: i64,
    comment: Option<&str>,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO block_requests (card_id, status, comment) VALUES (?, 'PENDING', ?)")
            .bind(card_id)
            .bind(comment)
            .execute(&mut **tx)
            .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_block_request(pool: &Pool<Sqlite>, request_id: i64) -> Result<Option<BlockRequest>> {
    let request = sqlx::query_as::<_, BlockRequest>("SELECT * FROM block_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?;

    Ok(request)
}

/// Locked fetch of a block request inside an open transaction; the decision
/// path re-validates the status against this row.
pub async fn lock_block_request(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: i64,
) -> Result<Option<BlockRequest>> {
    sqlx::query("UPDATE block_requests SET id = id WHERE id = ?")
        .bind(request_id)
        .execute(&mut **tx)
        .await?;

    let request = sqlx::query_as::<_, BlockRequest>("SELECT * FROM block_requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(request)
}

pub async fn pending_request_exists(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: i64,
) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM block_requests WHERE card_id = ? AND status = 'PENDING'",
    )
    .bind(card_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0 > 0)
}

pub async fn update_block_request(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: i64,
    status: BlockRequestStatus,
    comment: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE block_requests SET status = ?, comment = ?, updated_at = datetime('now') \
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(comment)
    .bind(request_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn list_block_requests_by_card(
    pool: &Pool<Sqlite>,
    card_id: i64,
) -> Result<Vec<BlockRequest>> {
    let requests = sqlx::query_as::<_, BlockRequest>(
        "SELECT * FROM block_requests WHERE card_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(card_id)
    .fetch_all(pool)
    .await?;

    Ok(requests)
}
