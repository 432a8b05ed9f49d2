/// 영속 저장소 어댑터
/// 엔티티별 저장소 구조체. 엔티티 단위 원자성만 가정하며,
/// 다중 엔티티 경계는 DatabaseManager::transaction으로 명시한다.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionStatus, Bid, Item, Payment};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

pub mod queries;

// endregion: --- Imports

// region:    --- Auction Store

/// 경매 저장소
#[derive(Clone)]
pub struct AuctionStore {
    pool: Arc<PgPool>,
}

impl AuctionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 경매 조회
    pub async fn get(&self, auction_id: Uuid) -> Result<Option<Auction>, sqlx::Error> {
        sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
            .bind(auction_id)
            .fetch_optional(&*self.pool)
            .await
    }

    /// 상태별 경매 조회
    pub async fn list_by_status(&self, status: AuctionStatus) -> Result<Vec<Auction>, sqlx::Error> {
        sqlx::query_as::<_, Auction>(queries::LIST_AUCTIONS_BY_STATUS)
            .bind(status)
            .fetch_all(&*self.pool)
            .await
    }

    /// 경매 저장 (last-write-wins)
    pub async fn save(&self, auction: &Auction) -> Result<(), sqlx::Error> {
        sqlx::query(queries::SAVE_AUCTION)
            .bind(auction.auction_id)
            .bind(auction.item_id)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(auction.status)
            .bind(auction.min_increment_percent)
            .bind(auction.current_highest_bid)
            .bind(auction.winner_id)
            .bind(auction.created_at)
            .bind(auction.updated_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// PENDING -> LIVE 전이. 이미 LIVE면 false (멱등)
    pub async fn mark_live(&self, auction_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(queries::MARK_AUCTION_LIVE)
            .bind(auction_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// LIVE -> COMPLETED 전이 (낙찰자 포함). 이미 COMPLETED면 false
    pub async fn complete_with_winner(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        auction_id: Uuid,
        winner_id: Uuid,
        winning_bid: Decimal,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(queries::COMPLETE_AUCTION_WITH_WINNER)
            .bind(auction_id)
            .bind(winner_id)
            .bind(winning_bid)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// LIVE -> COMPLETED 전이 (무입찰)
    pub async fn complete_without_winner(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        auction_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(queries::COMPLETE_AUCTION_WITHOUT_WINNER)
            .bind(auction_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 낙찰자/최고가 갱신 (결제 폴백)
    pub async fn set_winner(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        auction_id: Uuid,
        winner_id: Uuid,
        winning_bid: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(queries::SET_AUCTION_WINNER)
            .bind(auction_id)
            .bind(winner_id)
            .bind(winning_bid)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// 낙찰자/최고가 해제 (남은 입찰자 없음)
    pub async fn clear_winner(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        auction_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(queries::CLEAR_AUCTION_WINNER)
            .bind(auction_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// 입찰 수락 후 현재 최고가 기록
    pub async fn update_current_highest(
        &self,
        auction_id: Uuid,
        amount: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(queries::UPDATE_CURRENT_HIGHEST)
            .bind(auction_id)
            .bind(amount)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

// endregion: --- Auction Store

// region:    --- Item Store

/// 상품 저장소 (코어는 읽기만 한다)
#[derive(Clone)]
pub struct ItemStore {
    pool: Arc<PgPool>,
}

impl ItemStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 상품 조회
    pub async fn get(&self, item_id: Uuid) -> Result<Option<Item>, sqlx::Error> {
        sqlx::query_as::<_, Item>(queries::GET_ITEM)
            .bind(item_id)
            .fetch_optional(&*self.pool)
            .await
    }
}

// endregion: --- Item Store

// region:    --- Bid Store

/// 입찰 저장소 (추가 전용)
#[derive(Clone)]
pub struct BidStore {
    pool: Arc<PgPool>,
}

impl BidStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 입찰 기록 추가
    pub async fn append(&self, bid: &Bid) -> Result<(), sqlx::Error> {
        sqlx::query(queries::APPEND_BID)
            .bind(bid.bid_id)
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(bid.amount)
            .bind(bid.created_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// 입찰 이력 조회 (최근순)
    pub async fn list_desc_by_time(&self, auction_id: Uuid) -> Result<Vec<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(queries::LIST_BIDS_DESC_BY_TIME)
            .bind(auction_id)
            .fetch_all(&*self.pool)
            .await
    }

    /// 최고 입찰 조회
    pub async fn top_bid(&self, auction_id: Uuid) -> Result<Option<Bid>, sqlx::Error> {
        sqlx::query_as::<_, Bid>(queries::TOP_BID)
            .bind(auction_id)
            .fetch_optional(&*self.pool)
            .await
    }
}

// endregion: --- Bid Store

// region:    --- Payment Store

/// 결제 저장소
#[derive(Clone)]
pub struct PaymentStore {
    pool: Arc<PgPool>,
}

impl PaymentStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 결제 저장
    pub async fn save(&self, payment: &Payment) -> Result<(), sqlx::Error> {
        sqlx::query(queries::SAVE_PAYMENT)
            .bind(payment.payment_id)
            .bind(payment.auction_id)
            .bind(payment.bidder_id)
            .bind(payment.amount)
            .bind(payment.payment_type)
            .bind(payment.status)
            .bind(payment.due_by)
            .bind(payment.paid_at)
            .bind(payment.created_at)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// 트랜잭션 안에서 결제 저장 (폴백 시 새 보증금)
    pub async fn save_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment: &Payment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(queries::SAVE_PAYMENT)
            .bind(payment.payment_id)
            .bind(payment.auction_id)
            .bind(payment.bidder_id)
            .bind(payment.amount)
            .bind(payment.payment_type)
            .bind(payment.status)
            .bind(payment.due_by)
            .bind(payment.paid_at)
            .bind(payment.created_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// 결제 조회
    pub async fn get(&self, payment_id: Uuid) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(queries::GET_PAYMENT)
            .bind(payment_id)
            .fetch_optional(&*self.pool)
            .await
    }

    /// 미결 보증금 결제 전체 조회
    pub async fn list_pending_guarantees(&self) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(queries::LIST_PENDING_GUARANTEES)
            .fetch_all(&*self.pool)
            .await
    }

    /// PENDING -> FAILED 전이. 동시 SUCCESS가 이겼다면 false (호출자는 건너뛴다)
    pub async fn mark_failed(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(queries::MARK_PAYMENT_FAILED)
            .bind(payment_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// PENDING -> SUCCESS 전이
    pub async fn mark_success(
        &self,
        payment_id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(queries::MARK_PAYMENT_SUCCESS)
            .bind(payment_id)
            .bind(paid_at)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// endregion: --- Payment Store

// region:    --- User Store

/// 사용자 이름 조회 저장소 (읽기 전용)
#[derive(Clone)]
pub struct UserStore {
    pool: Arc<PgPool>,
}

impl UserStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 표시 이름 조회. 없으면 None
    pub async fn find_name(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(queries::GET_USER_NAME)
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|r| r.get("name")))
    }
}

// endregion: --- User Store
