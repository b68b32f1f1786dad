//! Card lifecycle: issuance, status transitions, deletion and balance
//! mutation. Every mutation locks the card row first and re-validates its
//! preconditions against the freshly locked row, inside one transaction.

use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite, Transaction};

use crate::{
    auth::Caller,
    crypto::{self, AesKey},
    db::{
        models::{Card, CardStatus, Page},
        queries,
    },
    error::AppError,
    validation,
};

const MAX_PAN_ATTEMPTS: u32 = 100;

fn card_not_found(card_id: i64) -> AppError {
    AppError::NotFound(format!("card not found: {}", card_id))
}

fn check_card_access(card: &Card, caller: &Caller) -> Result<(), AppError> {
    if caller.is_admin() || card.user_id == caller.user_id {
        Ok(())
    } else {
        Err(AppError::AccessDenied(
            "you don't have permission to access this card".into(),
        ))
    }
}

/// Draws random PANs until one misses the stored hash set, giving up after
/// a bounded number of attempts (number-space pressure is an operator
/// problem, not something to spin on).
pub async fn generate_unique_pan(pool: &Pool<Sqlite>, bin: &str) -> Result<String, AppError> {
    for attempt in 1..=MAX_PAN_ATTEMPTS {
        let pan = crypto::generate_pan(bin);
        debug_assert!(crypto::luhn_valid(&pan));
        if !queries::pan_hash_exists(pool, &crypto::hash_pan(&pan)).await? {
            tracing::debug!(attempt, "generated unique PAN");
            return Ok(pan);
        }
    }

    tracing::error!(attempts = MAX_PAN_ATTEMPTS, "failed to generate unique PAN");
    Err(AppError::GenerationExhausted)
}

/// Issues a new ACTIVE card with zero balance for the target user.
pub async fn create_card(
    pool: &Pool<Sqlite>,
    pan_key: &AesKey,
    bin: &str,
    caller: &Caller,
    user_id: i64,
) -> Result<Card, AppError> {
    caller.require_admin()?;

    queries::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user not found: {}", user_id)))?;

    let pan = generate_unique_pan(pool, bin).await?;
    let pan_encrypted = crypto::encrypt_pan(pan_key, &pan).map_err(AppError::Crypto)?;
    let pan_hash = crypto::hash_pan(&pan);
    let (exp_month, exp_year) = crypto::expiration_date();

    let card_id = queries::insert_card(
        pool,
        user_id,
        &pan_encrypted,
        &pan_hash,
        crypto::extract_last4(&pan),
        exp_month,
        exp_year,
    )
    .await?;

    let card = queries::get_card(pool, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    tracing::info!(card_id, user_id, admin = %caller.username, "issued card");
    Ok(card)
}

pub async fn get_card(pool: &Pool<Sqlite>, caller: &Caller, card_id: i64) -> Result<Card, AppError> {
    let card = queries::get_card(pool, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    check_card_access(&card, caller)?;
    Ok(card)
}

/// Masked display form of the card number (owner or admin).
pub async fn masked_number(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    card_id: i64,
) -> Result<String, AppError> {
    let card = get_card(pool, caller, card_id).await?;
    Ok(crypto::mask_pan(&card.pan_last4))
}

/// Lists cards, paginated. With a target user: that user's cards, visible to
/// the owner or an admin. Without one: all cards, admin only.
pub async fn list_cards(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    user_id: Option<i64>,
    page: Option<u32>,
    per_page: Option<u32>,
) -> Result<Page<Card>, AppError> {
    let (page, per_page) = validation::validate_pagination(page, per_page)?;
    // Widened so an extreme page number cannot overflow the multiply.
    let offset = i64::from(page - 1) * i64::from(per_page);

    let (items, total) = match user_id {
        Some(user_id) => {
            let user = queries::get_user_by_id(pool, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("user not found: {}", user_id)))?;

            if user.id != caller.user_id && !caller.is_admin() {
                return Err(AppError::AccessDenied("you can only view your own cards".into()));
            }

            queries::list_cards_by_user(pool, user_id, per_page, offset).await?
        }
        None => {
            caller.require_admin()?;
            queries::list_all_cards(pool, per_page, offset).await?
        }
    };

    Ok(Page { items, page, per_page, total })
}

/// Blocks an already-locked card row within the caller's transaction. Shared
/// with block-request approval so the card-status and request-status writes
/// commit or roll back together.
pub(crate) async fn block_card_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    card_id: i64,
) -> Result<(), AppError> {
    let card = queries::lock_card(tx, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    if card.status == CardStatus::Blocked {
        return Err(AppError::InvalidState("card is already blocked".into()));
    }

    queries::update_card_status(tx, card_id, CardStatus::Blocked).await?;
    Ok(())
}

pub async fn block_card(pool: &Pool<Sqlite>, caller: &Caller, card_id: i64) -> Result<Card, AppError> {
    caller.require_admin()?;

    let mut tx = pool.begin().await?;
    block_card_in_tx(&mut tx, card_id).await?;
    tx.commit().await?;

    tracing::info!(card_id, admin = %caller.username, "blocked card");
    queries::get_card(pool, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))
}

pub async fn unblock_card(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    card_id: i64,
) -> Result<Card, AppError> {
    caller.require_admin()?;

    let mut tx = pool.begin().await?;

    let card = queries::lock_card(&mut tx, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    if card.status == CardStatus::Active {
        return Err(AppError::InvalidState("card is already active".into()));
    }
    if crypto::is_expired(card.exp_month, card.exp_year) {
        return Err(AppError::InvalidState("cannot unblock expired card".into()));
    }

    queries::update_card_status(&mut tx, card_id, CardStatus::Active).await?;
    tx.commit().await?;

    tracing::info!(card_id, admin = %caller.username, "unblocked card");
    queries::get_card(pool, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))
}

pub async fn delete_card(pool: &Pool<Sqlite>, caller: &Caller, card_id: i64) -> Result<(), AppError> {
    caller.require_admin()?;

    let mut tx = pool.begin().await?;

    let card = queries::lock_card(&mut tx, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    if card.balance > Decimal::ZERO {
        return Err(AppError::InvalidState(
            "cannot delete card with non-zero balance".into(),
        ));
    }

    queries::delete_card(&mut tx, card_id).await?;
    tx.commit().await?;

    tracing::info!(card_id, admin = %caller.username, "deleted card");
    Ok(())
}

/// Credits the card. The card must be ACTIVE and unexpired, and the
/// resulting balance non-negative; all checked against the locked row.
pub async fn deposit(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    card_id: i64,
    amount: Decimal,
) -> Result<Card, AppError> {
    validation::validate_amount(amount)?;

    let mut tx = pool.begin().await?;

    let card = queries::lock_card(&mut tx, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))?;

    check_card_access(&card, caller)?;

    if card.status != CardStatus::Active {
        return Err(AppError::InvalidState(
            "cannot update balance for non-active card".into(),
        ));
    }
    if crypto::is_expired(card.exp_month, card.exp_year) {
        return Err(AppError::InvalidState(
            "cannot update balance for expired card".into(),
        ));
    }

    let new_balance = card.balance + amount;
    if new_balance < Decimal::ZERO {
        return Err(AppError::InsufficientFunds);
    }

    queries::update_card_balance(&mut tx, card_id, new_balance).await?;
    tx.commit().await?;

    tracing::info!(card_id, %amount, "deposit applied");
    queries::get_card(pool, card_id)
        .await?
        .ok_or_else(|| card_not_found(card_id))
}
