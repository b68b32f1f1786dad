//! Transfer engine: atomic two-card balance movement. Both rows are locked
//! in ascending-id order before any balance is read, every precondition is
//! re-validated against the locked rows, and the debit, credit and history
//! record commit in a single transaction.

use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};

use crate::{
    crypto,
    db::{models::CardStatus, queries},
    error::AppError,
    validation,
};

pub async fn transfer(
    pool: &Pool<Sqlite>,
    from_card_id: i64,
    to_card_id: i64,
    amount: Decimal,
    acting_username: &str,
) -> Result<(), AppError> {
    if from_card_id == to_card_id {
        return Err(AppError::InvalidArgument("cannot transfer to the same card".into()));
    }
    validation::validate_amount(amount)?;
    if acting_username.is_empty() {
        return Err(AppError::InvalidArgument("username cannot be empty".into()));
    }

    let user = queries::get_user_by_username(pool, acting_username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user not found: {}", acting_username)))?;

    let mut tx = pool.begin().await?;

    let cards = queries::lock_card_pair(&mut tx, from_card_id, to_card_id).await?;
    if cards.len() != 2 {
        return Err(AppError::NotFound("one or both cards not found".into()));
    }

    // lock_card_pair returns rows in id order, not argument order.
    let (from, to) = if cards[0].id == from_card_id {
        (&cards[0], &cards[1])
    } else {
        (&cards[1], &cards[0])
    };

    if from.user_id != user.id || to.user_id != user.id {
        return Err(AppError::AccessDenied(
            "you can transfer only between your own cards".into(),
        ));
    }

    if from.status != CardStatus::Active || to.status != CardStatus::Active {
        return Err(AppError::InvalidState("both cards must be active".into()));
    }

    if crypto::is_expired(from.exp_month, from.exp_year)
        || crypto::is_expired(to.exp_month, to.exp_year)
    {
        return Err(AppError::InvalidState("cannot transfer using expired card".into()));
    }

    let new_from_balance = from.balance - amount;
    if new_from_balance < Decimal::ZERO {
        return Err(AppError::InsufficientFunds);
    }

    queries::update_card_balance(&mut tx, from.id, new_from_balance).await?;
    queries::update_card_balance(&mut tx, to.id, to.balance + amount).await?;
    queries::insert_transfer(&mut tx, from.id, to.id, amount).await?;

    tx.commit().await?;

    tracing::info!(
        from_card_id,
        to_card_id,
        %amount,
        username = acting_username,
        "transfer completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ROLE_USER;
    use crate::cards;
    use crate::db::models::Transfer;
    use crate::db::test_pool;
    use crate::test_support::{admin, create_user, issue_card, set_balance, set_expiry};
    use rust_decimal_macros::dec;

    struct Fixture {
        pool: Pool<Sqlite>,
        admin: crate::auth::Caller,
        from: i64,
        to: i64,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let admin = admin(&pool).await;
        let alice = create_user(&pool, "alice", ROLE_USER).await;

        let from = issue_card(&pool, &admin, alice.user_id).await.id;
        let to = issue_card(&pool, &admin, alice.user_id).await.id;
        set_balance(&pool, from, dec!(1000)).await;
        set_balance(&pool, to, dec!(500)).await;

        Fixture { pool, admin, from, to }
    }

    async fn balance(pool: &Pool<Sqlite>, card_id: i64) -> Decimal {
        queries::get_card(pool, card_id).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn transfer_moves_exact_amounts() {
        let f = fixture().await;

        transfer(&f.pool, f.from, f.to, dec!(200), "alice").await.unwrap();

        assert_eq!(balance(&f.pool, f.from).await, dec!(800));
        assert_eq!(balance(&f.pool, f.to).await, dec!(700));

        // A history row is written alongside the balance updates.
        let recorded = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers")
            .fetch_all(&f.pool)
            .await
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].from_card_id, f.from);
        assert_eq!(recorded[0].to_card_id, f.to);
        assert_eq!(recorded[0].amount, dec!(200));
    }

    #[tokio::test]
    async fn conservation_holds_across_transfers() {
        let f = fixture().await;
        let before = balance(&f.pool, f.from).await + balance(&f.pool, f.to).await;

        transfer(&f.pool, f.from, f.to, dec!(123.45), "alice").await.unwrap();
        transfer(&f.pool, f.to, f.from, dec!(0.01), "alice").await.unwrap();

        let after = balance(&f.pool, f.from).await + balance(&f.pool, f.to).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rejects_bad_arguments() {
        let f = fixture().await;

        let err = transfer(&f.pool, f.from, f.from, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = transfer(&f.pool, f.from, f.to, dec!(0), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = transfer(&f.pool, f.from, f.to, dec!(-5), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Sub-cent precision never reaches the balances.
        let err = transfer(&f.pool, f.from, f.to, dec!(0.001), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(balance(&f.pool, f.from).await, dec!(1000));
    }

    #[tokio::test]
    async fn unknown_user_or_card_is_not_found() {
        let f = fixture().await;

        let err = transfer(&f.pool, f.from, f.to, dec!(10), "nobody").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = transfer(&f.pool, f.from, 9999, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cross_owner_transfer_is_denied() {
        let f = fixture().await;
        let bob = create_user(&f.pool, "bob", ROLE_USER).await;
        let bobs_card = issue_card(&f.pool, &f.admin, bob.user_id).await.id;

        // Denied even when one side does belong to the acting user.
        let err = transfer(&f.pool, f.from, bobs_card, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));

        let err = transfer(&f.pool, bobs_card, f.to, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));

        assert_eq!(balance(&f.pool, f.from).await, dec!(1000));
    }

    #[tokio::test]
    async fn blocked_or_expired_card_is_invalid_state() {
        let f = fixture().await;

        cards::block_card(&f.pool, &f.admin, f.to).await.unwrap();
        let err = transfer(&f.pool, f.from, f.to, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        cards::unblock_card(&f.pool, &f.admin, f.to).await.unwrap();

        set_expiry(&f.pool, f.from, 1, 2020).await;
        let err = transfer(&f.pool, f.from, f.to, dec!(10), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_balances_untouched() {
        let f = fixture().await;

        let err = transfer(&f.pool, f.from, f.to, dec!(1000.01), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds));

        assert_eq!(balance(&f.pool, f.from).await, dec!(1000));
        assert_eq!(balance(&f.pool, f.to).await, dec!(500));
    }

    #[tokio::test]
    async fn concurrent_transfers_cannot_both_overdraw() {
        let pool = test_pool().await;
        let admin = admin(&pool).await;
        let alice = create_user(&pool, "alice", ROLE_USER).await;
        let from = issue_card(&pool, &admin, alice.user_id).await.id;
        let to = issue_card(&pool, &admin, alice.user_id).await.id;
        set_balance(&pool, from, dec!(150)).await;

        let a = tokio::spawn({
            let pool = pool.clone();
            async move { transfer(&pool, from, to, dec!(100), "alice").await }
        });
        let b = tokio::spawn({
            let pool = pool.clone();
            async move { transfer(&pool, from, to, dec!(100), "alice").await }
        });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one transfer must win: {:?} {:?}", ra, rb);
        assert!(
            [ra, rb]
                .into_iter()
                .any(|r| matches!(r, Err(AppError::InsufficientFunds))),
            "the loser must fail with insufficient funds"
        );

        assert_eq!(balance(&pool, from).await, dec!(50));
        assert_eq!(balance(&pool, to).await, dec!(100));
    }

    #[tokio::test]
    async fn opposite_direction_transfers_both_complete() {
        let f = fixture().await;

        let a = tokio::spawn({
            let pool = f.pool.clone();
            let (from, to) = (f.from, f.to);
            async move { transfer(&pool, from, to, dec!(100), "alice").await }
        });
        let b = tokio::spawn({
            let pool = f.pool.clone();
            let (from, to) = (f.to, f.from);
            async move { transfer(&pool, from, to, dec!(100), "alice").await }
        });

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(balance(&f.pool, f.from).await, dec!(1000));
        assert_eq!(balance(&f.pool, f.to).await, dec!(500));
    }
}
