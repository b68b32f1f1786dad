//! Block-request workflow: owners ask for a card to be blocked, admins
//! decide. Approval blocks the card and marks the request in one
//! transaction; if the block fails, the request stays PENDING.

use sqlx::{Pool, Sqlite};

use crate::{
    auth::Caller,
    cards,
    db::{
        models::{BlockRequest, BlockRequestStatus},
        queries,
    },
    error::AppError,
    validation,
};

fn request_not_found(request_id: i64) -> AppError {
    AppError::NotFound(format!("block request not found: {}", request_id))
}

/// Files a PENDING block request for the caller's own card. At most one
/// PENDING request may exist per card.
pub async fn create_request(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    card_id: i64,
    comment: Option<&str>,
) -> Result<BlockRequest, AppError> {
    validation::validate_comment(comment)?;

    let mut tx = pool.begin().await?;

    let card = queries::lock_card(&mut tx, card_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("card not found: {}", card_id)))?;

    if card.user_id != caller.user_id {
        return Err(AppError::AccessDenied(
            "you can request block only for your own card".into(),
        ));
    }

    if queries::pending_request_exists(&mut tx, card_id).await? {
        return Err(AppError::InvalidState("block request already exists (PENDING)".into()));
    }

    let request_id = queries::insert_block_request(&mut tx, card_id, comment).await?;
    tx.commit().await?;

    tracing::info!(card_id, request_id, username = %caller.username, "created block request");
    queries::get_block_request(pool, request_id)
        .await?
        .ok_or_else(|| request_not_found(request_id))
}

/// Approves a PENDING request: blocks the card and marks the request
/// APPROVED together. A failed card block rolls the whole decision back.
pub async fn approve(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    request_id: i64,
    comment: Option<&str>,
) -> Result<BlockRequest, AppError> {
    caller.require_admin()?;
    validation::validate_comment(comment)?;

    let mut tx = pool.begin().await?;

    let request = queries::lock_block_request(&mut tx, request_id)
        .await?
        .ok_or_else(|| request_not_found(request_id))?;

    if request.status != BlockRequestStatus::Pending {
        return Err(AppError::InvalidState("only PENDING request can be approved".into()));
    }

    cards::block_card_in_tx(&mut tx, request.card_id).await?;
    queries::update_block_request(&mut tx, request_id, BlockRequestStatus::Approved, comment).await?;

    tx.commit().await?;

    tracing::info!(request_id, card_id = request.card_id, admin = %caller.username, "approved block request");
    queries::get_block_request(pool, request_id)
        .await?
        .ok_or_else(|| request_not_found(request_id))
}

/// Rejects a PENDING request; the card is untouched.
pub async fn reject(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    request_id: i64,
    comment: Option<&str>,
) -> Result<BlockRequest, AppError> {
    caller.require_admin()?;
    validation::validate_comment(comment)?;

    let mut tx = pool.begin().await?;

    let request = queries::lock_block_request(&mut tx, request_id)
        .await?
        .ok_or_else(|| request_not_found(request_id))?;

    if request.status != BlockRequestStatus::Pending {
        return Err(AppError::InvalidState("only PENDING request can be rejected".into()));
    }

    queries::update_block_request(&mut tx, request_id, BlockRequestStatus::Rejected, comment).await?;
    tx.commit().await?;

    tracing::info!(request_id, admin = %caller.username, "rejected block request");
    queries::get_block_request(pool, request_id)
        .await?
        .ok_or_else(|| request_not_found(request_id))
}

/// Lists a card's requests, newest first (owner or admin).
pub async fn list_by_card(
    pool: &Pool<Sqlite>,
    caller: &Caller,
    card_id: i64,
) -> Result<Vec<BlockRequest>, AppError> {
    // Reuses the card access rule: admins see any card's requests.
    cards::get_card(pool, caller, card_id).await?;
    Ok(queries::list_block_requests_by_card(pool, card_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ROLE_USER;
    use crate::db::models::CardStatus;
    use crate::db::test_pool;
    use crate::test_support::{admin, create_user, issue_card};

    struct Fixture {
        pool: Pool<Sqlite>,
        admin: Caller,
        alice: Caller,
        card_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let admin = admin(&pool).await;
        let alice = create_user(&pool, "alice", ROLE_USER).await;
        let card_id = issue_card(&pool, &admin, alice.user_id).await.id;
        Fixture { pool, admin, alice, card_id }
    }

    async fn card_status(pool: &Pool<Sqlite>, card_id: i64) -> CardStatus {
        queries::get_card(pool, card_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn owner_creates_pending_request() {
        let f = fixture().await;

        let request = create_request(&f.pool, &f.alice, f.card_id, Some("stolen wallet"))
            .await
            .unwrap();
        assert_eq!(request.card_id, f.card_id);
        assert_eq!(request.status, BlockRequestStatus::Pending);
        assert_eq!(request.comment.as_deref(), Some("stolen wallet"));

        // The card itself is untouched until an admin decides.
        assert_eq!(card_status(&f.pool, f.card_id).await, CardStatus::Active);
    }

    #[tokio::test]
    async fn non_owner_cannot_request_block() {
        let f = fixture().await;
        let bob = create_user(&f.pool, "bob", ROLE_USER).await;

        let err = create_request(&f.pool, &bob, f.card_id, None).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));

        let err = create_request(&f.pool, &f.alice, 9999, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn at_most_one_pending_request_per_card() {
        let f = fixture().await;

        let first = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();
        let err = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        // Once decided, a new request may be filed.
        reject(&f.pool, &f.admin, first.id, Some("card looks fine")).await.unwrap();
        assert!(create_request(&f.pool, &f.alice, f.card_id, None).await.is_ok());
    }

    #[tokio::test]
    async fn overlong_comment_is_rejected() {
        let f = fixture().await;
        let long = "x".repeat(501);
        let err = create_request(&f.pool, &f.alice, f.card_id, Some(&long)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn approve_blocks_card_and_closes_request() {
        let f = fixture().await;
        let request = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();

        let decided = approve(&f.pool, &f.admin, request.id, Some("confirmed")).await.unwrap();
        assert_eq!(decided.status, BlockRequestStatus::Approved);
        assert_eq!(decided.comment.as_deref(), Some("confirmed"));
        assert_eq!(card_status(&f.pool, f.card_id).await, CardStatus::Blocked);

        // Terminal: cannot re-decide.
        let err = approve(&f.pool, &f.admin, request.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        let err = reject(&f.pool, &f.admin, request.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn reject_leaves_card_untouched() {
        let f = fixture().await;
        let request = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();

        let decided = reject(&f.pool, &f.admin, request.id, Some("no grounds")).await.unwrap();
        assert_eq!(decided.status, BlockRequestStatus::Rejected);
        assert_eq!(card_status(&f.pool, f.card_id).await, CardStatus::Active);
    }

    #[tokio::test]
    async fn decisions_are_admin_only() {
        let f = fixture().await;
        let request = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();

        let err = approve(&f.pool, &f.alice, request.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
        let err = reject(&f.pool, &f.alice, request.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));

        let err = approve(&f.pool, &f.admin, 9999, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_block_leaves_request_pending() {
        let f = fixture().await;
        let request = create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();

        // Card gets blocked through another path before the decision.
        crate::cards::block_card(&f.pool, &f.admin, f.card_id).await.unwrap();

        let err = approve(&f.pool, &f.admin, request.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let request = queries::get_block_request(&f.pool, request.id).await.unwrap().unwrap();
        assert_eq!(request.status, BlockRequestStatus::Pending);
    }

    #[tokio::test]
    async fn listing_requests_respects_card_access() {
        let f = fixture().await;
        let bob = create_user(&f.pool, "bob", ROLE_USER).await;
        create_request(&f.pool, &f.alice, f.card_id, None).await.unwrap();

        assert_eq!(list_by_card(&f.pool, &f.alice, f.card_id).await.unwrap().len(), 1);
        assert_eq!(list_by_card(&f.pool, &f.admin, f.card_id).await.unwrap().len(), 1);

        let err = list_by_card(&f.pool, &bob, f.card_id).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }
}
