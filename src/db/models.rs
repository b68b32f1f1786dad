use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};
use std::str::FromStr;

/// User row joined with its role name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_name: String,
    pub enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Active,
    Blocked,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Blocked => "BLOCKED",
        }
    }
}

impl FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(CardStatus::Active),
            "BLOCKED" => Ok(CardStatus::Blocked),
            other => Err(format!("unknown card status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub pan_encrypted: String,
    #[serde(skip_serializing)]
    pub pan_hash: String,
    pub pan_last4: String,
    pub exp_month: u32,
    pub exp_year: i32,
    pub status: CardStatus,
    pub balance: Decimal,
    pub created_at: String,
    pub updated_at: String,
}

fn decode_error(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

// Manual FromRow: balance is stored as TEXT and surfaced as an exact Decimal,
// status as a typed enum.
impl FromRow<'_, SqliteRow> for Card {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let balance: String = row.try_get("balance")?;
        let balance = Decimal::from_str(&balance).map_err(|e| decode_error("balance", e))?;

        let status: String = row.try_get("status")?;
        let status = status
            .parse::<CardStatus>()
            .map_err(|e| decode_error("status", std::io::Error::other(e)))?;

        Ok(Card {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            pan_encrypted: row.try_get("pan_encrypted")?,
            pan_hash: row.try_get("pan_hash")?,
            pan_last4: row.try_get("pan_last4")?,
            exp_month: row.try_get("exp_month")?,
            exp_year: row.try_get("exp_year")?,
            status,
            balance,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Write-once record of a completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_card_id: i64,
    pub to_card_id: i64,
    pub amount: Decimal,
    pub created_at: String,
}

impl FromRow<'_, SqliteRow> for Transfer {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let amount: String = row.try_get("amount")?;
        let amount = Decimal::from_str(&amount).map_err(|e| decode_error("amount", e))?;

        Ok(Transfer {
            id: row.try_get("id")?,
            from_card_id: row.try_get("from_card_id")?,
            to_card_id: row.try_get("to_card_id")?,
            amount,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl BlockRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockRequestStatus::Pending => "PENDING",
            BlockRequestStatus::Approved => "APPROVED",
            BlockRequestStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for BlockRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BlockRequestStatus::Pending),
            "APPROVED" => Ok(BlockRequestStatus::Approved),
            "REJECTED" => Ok(BlockRequestStatus::Rejected),
            other => Err(format!("unknown block request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequest {
    pub id: i64,
    pub card_id: i64,
    pub status: BlockRequestStatus,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FromRow<'_, SqliteRow> for BlockRequest {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<BlockRequestStatus>()
            .map_err(|e| decode_error("status", std::io::Error::other(e)))?;

        Ok(BlockRequest {
            id: row.try_get("id")?,
            card_id: row.try_get("card_id")?,
            status,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// One page of a list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}
