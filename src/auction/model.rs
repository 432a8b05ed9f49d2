// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Status Variants

/// 경매 상태
/// COMPLETED / CANCELLED는 종료 상태로 더 이상 전이되지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Pending,
    Live,
    Completed,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Pending => "PENDING",
            AuctionStatus::Live => "LIVE",
            AuctionStatus::Completed => "COMPLETED",
            AuctionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 결제 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// 결제 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    Guarantee,
}

// endregion: --- Status Variants

// region:    --- Entities

/// 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub auction_id: Uuid,
    pub item_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub min_increment_percent: Decimal,
    pub current_highest_bid: Option<Decimal>,
    pub winner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 상품 모델 (코어는 시작가만 읽는다)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub item_id: Uuid,
    pub base_price: Decimal,
}

/// 입찰 모델 (영속 저장소에서는 추가만 되고 수정/삭제되지 않는다)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub bid_id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    /// 새 입찰 레코드 생성
    pub fn new(auction_id: Uuid, bidder_id: Uuid, amount: Decimal) -> Self {
        Self {
            bid_id: Uuid::new_v4(),
            auction_id,
            bidder_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// 보증금 결제 모델
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub auction_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub due_by: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// 낙찰자의 보증금(낙찰가의 절반) 결제 생성
    pub fn guarantee(
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: Decimal,
        due_by: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id: Uuid::new_v4(),
            auction_id,
            bidder_id,
            amount,
            payment_type: PaymentType::Guarantee,
            status: PaymentStatus::Pending,
            due_by: Some(due_by),
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

// endregion: --- Entities

// region:    --- Tests


// endregion: --- Tests
