/// 입찰 엔진
/// 1. 사전 검증 (라이브 상태 / 종료 시각 / 셀프 아웃비드)
/// 2. 원자 허가 스크립트
/// 3. 영속 기록 및 NEW_BID 이벤트
// region:    --- Imports
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auction::events::AuctionEvent;
use crate::auction::model::Bid;
use crate::bidding::model::{fixed2, BidEnvelope};
use crate::broadcast::{auction_topic, BroadcastHub};
use crate::error::{BidRejection, CoreError};
use crate::live::LiveStateManager;
use crate::store::{AuctionStore, BidStore, ItemStore, UserStore};

// endregion: --- Imports

// region:    --- Minimum Bid Rule

/// 다음 유효 입찰 최소가: ceil(최고가 * (1 + 인상률/100), 소수 2자리)
/// 최고가가 없으면 0 (첫 입찰은 시작가 규칙을 따른다)
pub fn minimum_next_bid(highest: Decimal, increment_percent: Decimal) -> Decimal {
    if highest <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let factor = Decimal::ONE + increment_percent / Decimal::ONE_HUNDRED;
    (highest * factor).round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

// endregion: --- Minimum Bid Rule

// region:    --- Bid Engine

/// 입찰 엔진
#[derive(Clone)]
pub struct BidEngine {
    auctions: AuctionStore,
    items: ItemStore,
    bids: BidStore,
    users: UserStore,
    live: Arc<LiveStateManager>,
    hub: Arc<BroadcastHub>,
}

impl BidEngine {
    pub fn new(
        auctions: AuctionStore,
        items: ItemStore,
        bids: BidStore,
        users: UserStore,
        live: Arc<LiveStateManager>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            auctions,
            items,
            bids,
            users,
            live,
            hub,
        }
    }

    /// 입찰 처리
    /// 허가는 라이브 저장소의 스크립트가 선형화하며, 네트워크 타임아웃 후
    /// 자동 재시도하지 않는다 (이중 허가 위험).
    pub async fn place_bid(
        &self,
        auction_id: Uuid,
        bidder_id: Uuid,
        amount: Decimal,
    ) -> Result<Bid, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(BidRejection::NonPositiveAmount.into());
        }
        let amount = fixed2(amount);

        // 사전 검증. 헤드 상태는 스크립트가 다시 검사하므로 여기의 실패는 안전하다
        let state = self
            .live
            .get_state(auction_id)
            .await?
            .ok_or(CoreError::InvalidBid(BidRejection::AuctionNotActive))?;
        if state.status != "LIVE" {
            return Err(BidRejection::AuctionNotActive.into());
        }
        if let Some(end_time) = state.end_time {
            // 종료 시각 정각 도착도 거절한다
            if end_time <= Utc::now() {
                return Err(BidRejection::AuctionEnded.into());
            }
        }
        if state.highest_bidder == Some(bidder_id) {
            return Err(BidRejection::SelfOutbid.into());
        }

        // 시작가와 인상률은 영속 저장소에서 가져온다
        let auction = self
            .auctions
            .get(auction_id)
            .await?
            .ok_or(CoreError::NotFound("경매"))?;
        let item = self
            .items
            .get(auction.item_id)
            .await?
            .ok_or(CoreError::NotFound("상품"))?;

        let bid = Bid::new(auction_id, bidder_id, amount);
        let envelope = BidEnvelope::from(&bid);
        let envelope_json = envelope
            .to_json()
            .map_err(|e| CoreError::TransientUnavailable(e.to_string()))?;

        // 원자 허가 스크립트
        let result = self
            .live
            .admit_bid(
                auction_id,
                envelope.amount,
                &envelope_json,
                bidder_id,
                fixed2(item.base_price),
                auction.min_increment_percent,
            )
            .await?;
        map_admission_result(&result, envelope.amount)?;

        // 수락된 입찰만 영속 기록. 충돌 시 라이브 저장소가 헤드의 권위이며,
        // 영속 공백은 스케줄러의 재투영이 메운다
        self.bids.append(&bid).await?;
        self.auctions
            .update_current_highest(auction_id, envelope.amount)
            .await?;

        info!(
            "{:<12} --> 입찰 수락: auction={}, bidder={}, amount={}",
            "BidEngine", auction_id, bidder_id, envelope.amount
        );

        self.emit_new_bid(&auction.min_increment_percent, &bid).await;

        Ok(bid)
    }

    /// NEW_BID 이벤트 발행 (수락 이후이므로 실패해도 입찰에는 영향 없음)
    async fn emit_new_bid(&self, increment_percent: &Decimal, bid: &Bid) {
        let bidder_name = match self.users.find_name(bid.bidder_id).await {
            Ok(name) => name.unwrap_or_default(),
            Err(e) => {
                warn!("{:<12} --> 입찰자 이름 조회 실패: {:?}", "BidEngine", e);
                String::new()
            }
        };
        let bid_count = match self.live.bid_count(bid.auction_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!("{:<12} --> 입찰 수 조회 실패: {:?}", "BidEngine", e);
                0
            }
        };
        let event = AuctionEvent::NewBid {
            auction_id: bid.auction_id,
            amount: fixed2(bid.amount),
            bidder_id: bid.bidder_id,
            bidder_name,
            minimum_bid: minimum_next_bid(bid.amount, *increment_percent),
            bid_count,
            timestamp: bid.created_at,
        };
        self.hub.publish(&auction_topic(bid.auction_id), event).await;
    }

    /// 현재 최고가 조회
    pub async fn current_highest(&self, auction_id: Uuid) -> Result<Decimal, CoreError> {
        self.live.current_highest(auction_id).await
    }

    /// 현재 최고 입찰자 조회
    pub async fn highest_bidder(&self, auction_id: Uuid) -> Result<Option<Uuid>, CoreError> {
        self.live.highest_bidder(auction_id).await
    }

    /// 최근 입찰 조회 (높은 금액부터)
    pub async fn recent_bids(
        &self,
        auction_id: Uuid,
        count: usize,
    ) -> Result<Vec<BidEnvelope>, CoreError> {
        self.live.recent_bids(auction_id, count).await
    }

    /// 입찰 수 조회
    pub async fn bid_count(&self, auction_id: Uuid) -> Result<u64, CoreError> {
        self.live.bid_count(auction_id).await
    }

    /// 다음 유효 입찰 최소가 조회
    pub async fn minimum_next_bid_for(
        &self,
        auction_id: Uuid,
        increment_percent: Decimal,
    ) -> Result<Decimal, CoreError> {
        let highest = self.live.current_highest(auction_id).await?;
        Ok(minimum_next_bid(highest, increment_percent))
    }
}

/// 허가 스크립트 결과 해석
/// "1" 수락, "-1:<현재>:<최소>" 인상률 미달, "-3:<시작가>" 시작가 미달
fn map_admission_result(result: &str, amount: Decimal) -> Result<(), CoreError> {
    if result == "1" {
        return Ok(());
    }
    if let Some(payload) = result.strip_prefix("-1:") {
        let mut parts = payload.splitn(2, ':');
        let current_highest = parts.next().unwrap_or_default().to_string();
        let minimum_required = parts.next().unwrap_or_default().to_string();
        return Err(BidRejection::BelowIncrement {
            current_highest,
            minimum_required,
        }
        .into());
    }
    if let Some(required_base) = result.strip_prefix("-3:") {
        return Err(BidRejection::BelowBasePrice {
            amount: amount.to_string(),
            required_base: required_base.to_string(),
        }
        .into());
    }
    Err(CoreError::TransientUnavailable(format!(
        "허가 스크립트 비정상 응답: {}",
        result
    )))
}

// endregion: --- Bid Engine

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minimum_next_bid_ten_percent() {
        let pct = dec!(10.00);
        assert_eq!(minimum_next_bid(dec!(8500.00), pct), dec!(9350.00));
        assert_eq!(minimum_next_bid(dec!(10000.00), pct), dec!(11000.00));
        assert_eq!(minimum_next_bid(dec!(9350.00), pct), dec!(10285.00));
    }

    #[test]
    fn test_minimum_next_bid_rounds_up_to_cent() {
        // 10.01 * 1.10 = 11.011 -> 올림 11.02
        assert_eq!(minimum_next_bid(dec!(10.01), dec!(10.00)), dec!(11.02));
    }

    #[test]
    fn test_minimum_next_bid_zero_highest() {
        assert_eq!(minimum_next_bid(Decimal::ZERO, dec!(10.00)), Decimal::ZERO);
    }

    #[test]
    fn test_map_admission_accept() {
        assert!(map_admission_result("1", dec!(9350.00)).is_ok());
    }

    #[test]
    fn test_map_admission_below_increment() {
        let err = map_admission_result("-1:10000.00:11000.00", dec!(10999.99)).unwrap_err();
        match err {
            CoreError::InvalidBid(BidRejection::BelowIncrement {
                current_highest,
                minimum_required,
            }) => {
                assert_eq!(current_highest, "10000.00");
                assert_eq!(minimum_required, "11000.00");
            }
            other => panic!("예상 밖의 에러: {:?}", other),
        }
    }

    #[test]
    fn test_map_admission_below_base_price() {
        let err = map_admission_result("-3:8500.00", dec!(8000.00)).unwrap_err();
        match err {
            CoreError::InvalidBid(BidRejection::BelowBasePrice {
                amount,
                required_base,
            }) => {
                assert_eq!(amount, "8000.00");
                assert_eq!(required_base, "8500.00");
            }
            other => panic!("예상 밖의 에러: {:?}", other),
        }
    }

    #[test]
    fn test_map_admission_unexpected_result() {
        let err = map_admission_result("-9:???", dec!(100.00)).unwrap_err();
        assert!(matches!(err, CoreError::TransientUnavailable(_)));
    }
}

// endregion: --- Tests
