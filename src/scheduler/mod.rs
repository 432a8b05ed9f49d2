/// 경매 라이프사이클 스케줄러
/// 주기적 틱마다 순서대로 수행한다:
/// (a) PENDING -> LIVE 활성화 및 라이브 투영
/// (b) LIVE -> COMPLETED 종료 및 보증금 결제 생성
/// (c) 보증금 결제 타임아웃 처리와 차순위 폴백
/// 전이는 상태 조건이 걸린 UPDATE로 보호되므로 틱은 재실행에 안전하다.
// region:    --- Imports
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionStatus, Payment};
use crate::broadcast::{auction_topic, BroadcastHub, UPDATES_TOPIC};
use crate::config::CoreConfig;
use crate::database::DatabaseManager;
use crate::error::CoreError;
use crate::live::LiveStateManager;
use crate::store::{AuctionStore, BidStore, PaymentStore};

// endregion: --- Imports

// region:    --- Guarantee Rule

/// 보증금: 낙찰가의 절반, 소수 2자리 반올림(사사오입)
pub fn guarantee_amount(winning_bid: Decimal) -> Decimal {
    (winning_bid / Decimal::TWO).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// endregion: --- Guarantee Rule

// region:    --- Auction Scheduler

/// 경매 라이프사이클 스케줄러
#[derive(Clone)]
pub struct AuctionScheduler {
    db: Arc<DatabaseManager>,
    auctions: AuctionStore,
    bids: BidStore,
    payments: PaymentStore,
    live: Arc<LiveStateManager>,
    hub: Arc<BroadcastHub>,
    config: CoreConfig,
}

impl AuctionScheduler {
    pub fn new(
        db: Arc<DatabaseManager>,
        live: Arc<LiveStateManager>,
        hub: Arc<BroadcastHub>,
        config: CoreConfig,
    ) -> Self {
        let pool = db.get_pool();
        Self {
            db,
            auctions: AuctionStore::new(Arc::clone(&pool)),
            bids: BidStore::new(Arc::clone(&pool)),
            payments: PaymentStore::new(pool),
            live,
            hub,
            config,
        }
    }

    /// 스케줄러 시작
    pub async fn start(&self) {
        let scheduler = self.clone();
        let tick_ms = self.config.scheduler_tick_ms;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(tick_ms));
            loop {
                ticker.tick().await;
                scheduler.tick().await;
            }
        });
    }

    /// 한 번의 틱. 경매 하나의 실패가 틱 전체를 멈추지 않는다
    pub async fn tick(&self) {
        if let Err(e) = self.activate_pending_auctions().await {
            error!("{:<12} --> 경매 활성화 중 오류 발생: {:?}", "Scheduler", e);
        }
        if let Err(e) = self.complete_live_auctions().await {
            error!("{:<12} --> 경매 종료 처리 중 오류 발생: {:?}", "Scheduler", e);
        }
        if let Err(e) = self.check_payment_timeouts().await {
            error!(
                "{:<12} --> 결제 타임아웃 처리 중 오류 발생: {:?}",
                "Scheduler", e
            );
        }
    }

    // region:    --- (a) Activate

    /// 시작 시각이 지난 PENDING 경매를 LIVE로 전이하고 라이브 저장소에 투영
    async fn activate_pending_auctions(&self) -> Result<(), CoreError> {
        let pending = self.auctions.list_by_status(AuctionStatus::Pending).await?;
        let now = Utc::now();

        for auction in pending {
            if auction.start_time > now {
                continue;
            }
            if let Err(e) = self.activate_one(&auction).await {
                error!(
                    "{:<12} --> 경매 {} 활성화 실패: {:?}",
                    "Scheduler", auction.auction_id, e
                );
            }
        }
        Ok(())
    }

    /// 경매 하나 활성화. 이미 LIVE면 투영만 보장한다 (멱등)
    async fn activate_one(&self, auction: &Auction) -> Result<(), CoreError> {
        let transitioned = self.auctions.mark_live(auction.auction_id).await?;
        self.ensure_projected(auction).await?;

        if transitioned {
            self.hub
                .publish(
                    UPDATES_TOPIC,
                    AuctionEvent::AuctionStarted {
                        auction_id: auction.auction_id,
                        item_id: auction.item_id,
                    },
                )
                .await;
            info!(
                "{:<12} --> 경매 {} LIVE 전환", "Scheduler", auction.auction_id
            );
        }
        Ok(())
    }

    /// 라이브 투영 보장
    /// 영속 저장소의 입찰 이력까지 적재하므로 라이브 저장소가 비워진 뒤의
    /// 콜드 재기동에서도 복구된다.
    async fn ensure_projected(&self, auction: &Auction) -> Result<(), CoreError> {
        if self.live.is_projected(auction.auction_id).await? {
            return Ok(());
        }
        let existing_bids = self.bids.list_desc_by_time(auction.auction_id).await?;
        self.live.project_auction(auction, &existing_bids).await?;
        info!(
            "{:<12} --> 경매 {} 라이브 투영 (기존 입찰 {}건)",
            "Scheduler",
            auction.auction_id,
            existing_bids.len()
        );
        Ok(())
    }

    // endregion: --- (a) Activate

    // region:    --- (b) Close

    /// 종료 시각이 지난 LIVE 경매를 COMPLETED로 전이
    async fn complete_live_auctions(&self) -> Result<(), CoreError> {
        let live_auctions = self.auctions.list_by_status(AuctionStatus::Live).await?;
        let now = Utc::now();

        for auction in live_auctions {
            if now > auction.end_time {
                if let Err(e) = self.close_one(&auction).await {
                    error!(
                        "{:<12} --> 경매 {} 종료 처리 실패: {:?}",
                        "Scheduler", auction.auction_id, e
                    );
                }
            } else if let Err(e) = self.ensure_projected(&auction).await {
                // 라이브 저장소 재기동 후의 방어적 재투영
                error!(
                    "{:<12} --> 경매 {} 재투영 실패: {:?}",
                    "Scheduler", auction.auction_id, e
                );
            }
        }
        Ok(())
    }

    /// 경매 하나 종료. 헤드는 라이브 저장소가 권위다
    async fn close_one(&self, auction: &Auction) -> Result<(), CoreError> {
        let auction_id = auction.auction_id;
        let highest = self.live.current_highest(auction_id).await?;
        let highest_bidder = self.live.highest_bidder(auction_id).await?;

        if highest > Decimal::ZERO {
            if let Some(winner_id) = highest_bidder {
                let now = Utc::now();
                let due_by =
                    now + ChronoDuration::minutes(self.config.payment_window_minutes);
                let payment =
                    Payment::guarantee(auction_id, winner_id, guarantee_amount(highest), due_by);

                // 종료는 경매당 하나의 트랜잭션: 상태 전이 + 결제 행
                let auctions = self.auctions.clone();
                let payments = self.payments.clone();
                let payment_row = payment.clone();
                let transitioned: bool = self
                    .db
                    .transaction::<_, bool, CoreError>(|tx| {
                        Box::pin(async move {
                            let transitioned = auctions
                                .complete_with_winner(tx, auction_id, winner_id, highest)
                                .await?;
                            if transitioned {
                                payments.save_in_tx(tx, &payment_row).await?;
                            }
                            Ok(transitioned)
                        })
                    })
                    .await?;

                if transitioned {
                    self.hub
                        .publish(
                            &auction_topic(auction_id),
                            AuctionEvent::AuctionEnded {
                                auction_id,
                                winner_id,
                                winning_bid: highest,
                                payment_amount: payment.amount,
                                payment_deadline: due_by,
                            },
                        )
                        .await;
                    info!(
                        "{:<12} --> 경매 {} 낙찰 종료: winner={}, bid={}",
                        "Scheduler", auction_id, winner_id, highest
                    );
                }
                return Ok(());
            }
        }

        // 입찰 없이 종료
        let auctions = self.auctions.clone();
        let transitioned: bool = self
            .db
            .transaction::<_, bool, CoreError>(|tx| {
                Box::pin(
                    async move { Ok(auctions.complete_without_winner(tx, auction_id).await?) },
                )
            })
            .await?;

        if transitioned {
            self.live.deactivate(auction_id).await?;
            self.hub
                .publish(
                    &auction_topic(auction_id),
                    AuctionEvent::AuctionEndedNoBids { auction_id },
                )
                .await;
            info!(
                "{:<12} --> 경매 {} 무입찰 종료", "Scheduler", auction_id
            );
        }
        Ok(())
    }

    // endregion: --- (b) Close

    // region:    --- (c) Payment Timeout

    /// 마감이 지난 보증금 결제를 FAILED 처리하고 차순위 입찰자로 폴백
    async fn check_payment_timeouts(&self) -> Result<(), CoreError> {
        let pending = self.payments.list_pending_guarantees().await?;
        let now = Utc::now();

        for payment in pending {
            let expired = payment.due_by.map_or(false, |due| due < now);
            if !expired {
                continue;
            }
            if let Err(e) = self.fail_payment_and_fallback(&payment).await {
                error!(
                    "{:<12} --> 결제 {} 폴백 처리 실패: {:?}",
                    "Scheduler", payment.payment_id, e
                );
            }
        }
        Ok(())
    }

    /// 결제 하나의 타임아웃 처리
    /// FAILED 전이를 먼저 커밋하고 나서 헤드를 제거한다. 전이가 PENDING 조건으로
    /// 보호되므로 틱이 재실행되어도 같은 결제로 헤드를 두 번 빼지 않는다.
    /// 헤드 제거 자체는 라이브 저장소의 선형화 지점이라 어떤 영속 트랜잭션에도
    /// 넣지 않는다. 낙찰자/새 결제 갱신이 그 뒤의 트랜잭션이다.
    async fn fail_payment_and_fallback(&self, payment: &Payment) -> Result<(), CoreError> {
        let auction_id = payment.auction_id;
        let Some(_auction) = self.auctions.get(auction_id).await? else {
            warn!(
                "{:<12} --> 결제 {}의 경매 {}이(가) 없습니다",
                "Scheduler", payment.payment_id, auction_id
            );
            return Ok(());
        };

        info!(
            "{:<12} --> 결제 타임아웃: auction={}, bidder={}",
            "Scheduler", auction_id, payment.bidder_id
        );

        // PENDING 조건이 걸려 있어 동시 SUCCESS가 이기면 no-op
        let payments = self.payments.clone();
        let payment_id = payment.payment_id;
        let failed: bool = self
            .db
            .transaction::<_, bool, CoreError>(|tx| {
                Box::pin(async move { Ok(payments.mark_failed(tx, payment_id).await?) })
            })
            .await?;
        if !failed {
            info!(
                "{:<12} --> 결제 {}은(는) 이미 완료되어 폴백을 건너뜁니다",
                "Scheduler", payment.payment_id
            );
            return Ok(());
        }

        // FAILED가 커밋된 뒤에만 헤드를 제거한다 (영속 트랜잭션 밖)
        let new_head = self.live.remove_head(auction_id).await?;
        let due_by = Utc::now() + ChronoDuration::minutes(self.config.payment_window_minutes);

        match new_head {
            Some(new_head) => {
                let next_payment = Payment::guarantee(
                    auction_id,
                    new_head.bidder_id,
                    guarantee_amount(new_head.amount),
                    due_by,
                );

                // 낙찰자/새 보증금 갱신은 하나의 트랜잭션이다
                let auctions = self.auctions.clone();
                let payments = self.payments.clone();
                let payment_row = next_payment.clone();
                let new_winner_id = new_head.bidder_id;
                let new_winning_bid = new_head.amount;
                self.db
                    .transaction::<_, (), CoreError>(|tx| {
                        Box::pin(async move {
                            auctions
                                .set_winner(tx, auction_id, new_winner_id, new_winning_bid)
                                .await?;
                            payments.save_in_tx(tx, &payment_row).await?;
                            Ok(())
                        })
                    })
                    .await?;

                self.hub
                    .publish(
                        &auction_topic(auction_id),
                        AuctionEvent::PaymentFallback {
                            auction_id,
                            previous_bidder: payment.bidder_id,
                            new_winner_id,
                            new_winning_bid,
                            payment_amount: next_payment.amount,
                            payment_deadline: due_by,
                        },
                    )
                    .await;
                info!(
                    "{:<12} --> 경매 {} 낙찰이 {}에게 넘어갔습니다",
                    "Scheduler", auction_id, new_winner_id
                );
            }
            None => {
                let auctions = self.auctions.clone();
                self.db
                    .transaction::<_, (), CoreError>(|tx| {
                        Box::pin(async move { Ok(auctions.clear_winner(tx, auction_id).await?) })
                    })
                    .await?;

                self.live.deactivate(auction_id).await?;
                self.hub
                    .publish(
                        &auction_topic(auction_id),
                        AuctionEvent::AuctionNoWinner { auction_id },
                    )
                    .await;
                info!(
                    "{:<12} --> 경매 {}에 남은 유효 입찰자가 없습니다",
                    "Scheduler", auction_id
                );
            }
        }
        Ok(())
    }

    // endregion: --- (c) Payment Timeout
}

// endregion: --- Auction Scheduler

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_guarantee_is_half_rounded_half_up() {
        assert_eq!(guarantee_amount(dec!(10285.00)), dec!(5142.50));
        assert_eq!(guarantee_amount(dec!(55000.00)), dec!(27500.00));
        assert_eq!(guarantee_amount(dec!(50000.00)), dec!(25000.00));
        // 중간값은 올림 처리
        assert_eq!(guarantee_amount(dec!(333.33)), dec!(166.67));
    }
}

// endregion: --- Tests
