// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Auction Events

/// 브로드캐스트 허브로 내보내는 경매 이벤트
/// 금액은 손실 없이 왕복되도록 고정 소수점 문자열로 직렬화된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuctionEvent {
    // 입찰 수락 이벤트
    #[serde(rename = "NEW_BID", rename_all = "camelCase")]
    NewBid {
        auction_id: Uuid,
        amount: Decimal,
        bidder_id: Uuid,
        bidder_name: String,
        minimum_bid: Decimal,
        bid_count: u64,
        timestamp: DateTime<Utc>,
    },
    // 경매 시작 이벤트
    #[serde(rename = "AUCTION_STARTED", rename_all = "camelCase")]
    AuctionStarted { auction_id: Uuid, item_id: Uuid },
    // 낙찰 종료 이벤트 (보증금 결제 창 시작)
    #[serde(rename = "AUCTION_ENDED", rename_all = "camelCase")]
    AuctionEnded {
        auction_id: Uuid,
        winner_id: Uuid,
        winning_bid: Decimal,
        payment_amount: Decimal,
        payment_deadline: DateTime<Utc>,
    },
    // 무입찰 종료 이벤트
    #[serde(rename = "AUCTION_ENDED_NO_BIDS", rename_all = "camelCase")]
    AuctionEndedNoBids { auction_id: Uuid },
    // 결제 불이행으로 차순위 입찰자에게 낙찰이 넘어간 이벤트
    #[serde(rename = "PAYMENT_FALLBACK", rename_all = "camelCase")]
    PaymentFallback {
        auction_id: Uuid,
        previous_bidder: Uuid,
        new_winner_id: Uuid,
        new_winning_bid: Decimal,
        payment_amount: Decimal,
        payment_deadline: DateTime<Utc>,
    },
    // 보증금 결제 완료 이벤트
    #[serde(rename = "PAYMENT_COMPLETED", rename_all = "camelCase")]
    PaymentCompleted {
        auction_id: Uuid,
        bidder_id: Uuid,
        bidder_name: String,
    },
    // 남은 입찰자가 없어 낙찰자 없이 종료된 이벤트
    #[serde(rename = "AUCTION_NO_WINNER", rename_all = "camelCase")]
    AuctionNoWinner { auction_id: Uuid },
}

// endregion: --- Auction Events

// region:    --- Tests


// endregion: --- Tests
