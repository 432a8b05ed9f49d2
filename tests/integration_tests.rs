//! 실행 중인 서비스(서버 + PostgreSQL + Redis)를 대상으로 하는 통합 테스트
//! `cargo test -- --ignored`로 실행한다. DURABLE_STORE_URL이 필요하다.
use chrono::{Duration, Utc};
use eauction_core::auction::model::{Auction, AuctionStatus};
use eauction_core::database::DatabaseManager;
use eauction_core::store::{AuctionStore, BidStore, PaymentStore};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:3000";

/// 데이터베이스 매니저 설정
async fn setup() -> Arc<DatabaseManager> {
    let durable_store_url =
        std::env::var("DURABLE_STORE_URL").expect("DURABLE_STORE_URL must be set");
    Arc::new(DatabaseManager::new(&durable_store_url).await)
}

/// 테스트용 사용자 생성
async fn create_test_user(db_manager: &DatabaseManager, name: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (user_id, name) VALUES ($1, $2)")
        .bind(user_id)
        .bind(name)
        .execute(db_manager.pool())
        .await
        .unwrap();
    user_id
}

/// 테스트용 상품 생성
async fn create_test_item(db_manager: &DatabaseManager, base_price: Decimal) -> Uuid {
    let item_id = Uuid::new_v4();
    sqlx::query("INSERT INTO items (item_id, base_price) VALUES ($1, $2)")
        .bind(item_id)
        .bind(base_price)
        .execute(db_manager.pool())
        .await
        .unwrap();
    item_id
}

/// 테스트용 경매 생성 (시작 시각이 지났으므로 다음 틱에 LIVE가 된다)
async fn create_test_auction(
    db_manager: &DatabaseManager,
    base_price: Decimal,
    duration_secs: i64,
) -> Auction {
    let item_id = create_test_item(db_manager, base_price).await;
    let now = Utc::now();
    let auction = Auction {
        auction_id: Uuid::new_v4(),
        item_id,
        start_time: now - Duration::seconds(1),
        end_time: now + Duration::seconds(duration_secs),
        status: AuctionStatus::Pending,
        min_increment_percent: dec!(10.00),
        current_highest_bid: None,
        winner_id: None,
        created_at: now,
        updated_at: now,
    };
    AuctionStore::new(db_manager.get_pool())
        .save(&auction)
        .await
        .unwrap();
    auction
}

/// 스케줄러가 경매를 LIVE로 전환할 때까지 대기
async fn wait_for_live(auction_id: Uuid) {
    let client = Client::new();
    for _ in 0..10 {
        tokio::time::sleep(tokio::time::Duration::from_millis(1000)).await;
        let state: Value = client
            .get(format!("{}/api/auction/{}/state", BASE_URL, auction_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if state["status"] == "LIVE" {
            return;
        }
    }
    panic!("경매가 LIVE로 전환되지 않았습니다");
}

/// 입찰 요청 전송
async fn place_bid(client: &Client, auction_id: Uuid, bidder_id: Uuid, amount: &str) -> (u16, Value) {
    let response = client
        .post(format!("{}/api/auction/{}/bid", BASE_URL, auction_id))
        .header("X-Bidder-Id", bidder_id.to_string())
        .json(&serde_json::json!({ "amount": amount }))
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap();
    (status, body)
}

/// 단순 경매 시나리오: 첫 입찰, 셀프 아웃비드 거절, 인상률 준수 입찰, 종료 후 보증금
#[tokio::test]
#[ignore = "실행 중인 서버와 PostgreSQL, Redis가 필요합니다"]
async fn test_simple_auction_lifecycle() {
    let db_manager = setup().await;
    let client = Client::new();

    let auction = create_test_auction(&db_manager, dec!(8500.00), 12).await;
    let bidder_a = create_test_user(&db_manager, "입찰자A").await;
    let bidder_b = create_test_user(&db_manager, "입찰자B").await;
    wait_for_live(auction.auction_id).await;

    // 첫 입찰은 시작가 정각에 수락된다
    let (status, body) = place_bid(&client, auction.auction_id, bidder_a, "8500.00").await;
    assert_eq!(status, 200, "{:?}", body);
    assert_eq!(body["success"], true);

    // 같은 입찰자의 연속 입찰은 거절된다
    let (status, body) = place_bid(&client, auction.auction_id, bidder_a, "9350.00").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "SELF_OUTBID");

    // 다른 입찰자의 인상률 준수 입찰은 수락된다
    let (status, _) = place_bid(&client, auction.auction_id, bidder_b, "9350.00").await;
    assert_eq!(status, 200);
    let (status, _) = place_bid(&client, auction.auction_id, bidder_a, "10285.00").await;
    assert_eq!(status, 200);

    // 상태 조회는 라이브 뷰를 반영한다
    let state: Value = client
        .get(format!(
            "{}/api/auction/{}/state",
            BASE_URL, auction.auction_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["currentHighest"], "10285.00");
    assert_eq!(state["bidCount"], 3);
    assert_eq!(state["highestBidder"], bidder_a.to_string());

    // 종료 대기 후 낙찰 확인
    tokio::time::sleep(tokio::time::Duration::from_secs(14)).await;
    let closed = AuctionStore::new(db_manager.get_pool())
        .get(auction.auction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, AuctionStatus::Completed);
    assert_eq!(closed.winner_id, Some(bidder_a));
    assert_eq!(closed.current_highest_bid, Some(dec!(10285.00)));

    // 영속 이력의 최고 입찰도 라이브 헤드와 일치한다
    let top = BidStore::new(db_manager.get_pool())
        .top_bid(auction.auction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(top.amount, dec!(10285.00));
    assert_eq!(top.bidder_id, bidder_a);

    // 보증금은 낙찰가의 절반이다
    let payments = PaymentStore::new(db_manager.get_pool())
        .list_pending_guarantees()
        .await
        .unwrap();
    let payment = payments
        .iter()
        .find(|p| p.auction_id == auction.auction_id)
        .expect("보증금 결제가 생성되어야 합니다");
    assert_eq!(payment.bidder_id, bidder_a);
    assert_eq!(payment.amount, dec!(5142.50));
}

/// 인상률 경계: 1센트 모자란 입찰은 거절되고 정확한 최소가는 수락된다
#[tokio::test]
#[ignore = "실행 중인 서버와 PostgreSQL, Redis가 필요합니다"]
async fn test_below_increment_rejection() {
    let db_manager = setup().await;
    let client = Client::new();

    let auction = create_test_auction(&db_manager, dec!(10000.00), 60).await;
    let bidder_a = create_test_user(&db_manager, "입찰자A").await;
    let bidder_b = create_test_user(&db_manager, "입찰자B").await;
    wait_for_live(auction.auction_id).await;

    let (status, _) = place_bid(&client, auction.auction_id, bidder_a, "10000.00").await;
    assert_eq!(status, 200);

    // 10999.99 < 11000.00 이므로 거절. 메시지에 두 금액이 모두 실린다
    let (status, body) = place_bid(&client, auction.auction_id, bidder_b, "10999.99").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "BELOW_INCREMENT");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("10000.00"));
    assert!(message.contains("11000.00"));

    let (status, _) = place_bid(&client, auction.auction_id, bidder_b, "11000.00").await;
    assert_eq!(status, 200);
}

/// 결제 타임아웃 폴백: 낙찰자가 결제하지 않으면 차순위 입찰자에게 넘어간다
#[tokio::test]
#[ignore = "실행 중인 서버와 PostgreSQL, Redis가 필요합니다"]
async fn test_payment_timeout_fallback() {
    let db_manager = setup().await;
    let client = Client::new();

    let auction = create_test_auction(&db_manager, dec!(50000.00), 8).await;
    let bidder_x = create_test_user(&db_manager, "입찰자X").await;
    let bidder_y = create_test_user(&db_manager, "입찰자Y").await;
    wait_for_live(auction.auction_id).await;

    let (status, _) = place_bid(&client, auction.auction_id, bidder_x, "50000.00").await;
    assert_eq!(status, 200);
    let (status, _) = place_bid(&client, auction.auction_id, bidder_y, "55000.00").await;
    assert_eq!(status, 200);

    // 종료 후 Y가 잠정 낙찰자가 된다
    tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
    let auctions = AuctionStore::new(db_manager.get_pool());
    let closed = auctions.get(auction.auction_id).await.unwrap().unwrap();
    assert_eq!(closed.winner_id, Some(bidder_y));

    // 결제 마감을 과거로 돌려 불이행을 흉내낸다
    sqlx::query("UPDATE payments SET due_by = now() - interval '1 second' WHERE auction_id = $1 AND status = 'PENDING'")
        .bind(auction.auction_id)
        .execute(db_manager.pool())
        .await
        .unwrap();

    // 다음 틱에서 폴백이 일어난다
    tokio::time::sleep(tokio::time::Duration::from_secs(4)).await;
    let rolled = auctions.get(auction.auction_id).await.unwrap().unwrap();
    assert_eq!(rolled.winner_id, Some(bidder_x));
    assert_eq!(rolled.current_highest_bid, Some(dec!(50000.00)));

    // 새 보증금은 새 낙찰가의 절반이다
    let payments = PaymentStore::new(db_manager.get_pool())
        .list_pending_guarantees()
        .await
        .unwrap();
    let payment = payments
        .iter()
        .find(|p| p.auction_id == auction.auction_id)
        .expect("폴백 보증금 결제가 생성되어야 합니다");
    assert_eq!(payment.bidder_id, bidder_x);
    assert_eq!(payment.amount, dec!(25000.00));

    // 유일한 남은 낙찰자도 불이행하면 낙찰자 없이 끝난다
    sqlx::query("UPDATE payments SET due_by = now() - interval '1 second' WHERE auction_id = $1 AND status = 'PENDING'")
        .bind(auction.auction_id)
        .execute(db_manager.pool())
        .await
        .unwrap();
    tokio::time::sleep(tokio::time::Duration::from_secs(4)).await;
    let ended = auctions.get(auction.auction_id).await.unwrap().unwrap();
    assert_eq!(ended.winner_id, None);
    assert_eq!(ended.current_highest_bid, None);
}

/// 동시성: 동일 금액의 동시 입찰은 정확히 하나만 수락된다
#[tokio::test]
#[ignore = "실행 중인 서버와 PostgreSQL, Redis가 필요합니다"]
async fn test_concurrent_identical_bids() {
    let db_manager = setup().await;
    let client = Client::new();

    let auction = create_test_auction(&db_manager, dec!(18000.00), 60).await;
    let seed_bidder = create_test_user(&db_manager, "선행입찰자").await;
    wait_for_live(auction.auction_id).await;

    let (status, _) = place_bid(&client, auction.auction_id, seed_bidder, "18000.00").await;
    assert_eq!(status, 200);

    // 동일 금액 20000.00으로 두 입찰자가 동시에 요청한다
    let mut handles = vec![];
    for i in 0..2 {
        let bidder = create_test_user(&db_manager, &format!("동시입찰자{}", i + 1)).await;
        let auction_id = auction.auction_id;
        handles.push(tokio::spawn(async move {
            let client = Client::new();
            place_bid(&client, auction_id, bidder, "20000.00").await
        }));
    }

    let mut successful_bids = 0;
    let mut rejected_bids = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == 200 {
            successful_bids += 1;
        } else {
            assert_eq!(body["code"], "BELOW_INCREMENT", "{:?}", body);
            rejected_bids += 1;
        }
    }
    assert_eq!(successful_bids, 1);
    assert_eq!(rejected_bids, 1);
}
