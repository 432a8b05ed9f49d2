// region:    --- Imports
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use eauction_core::bidding::BidEngine;
use eauction_core::broadcast::BroadcastHub;
use eauction_core::config::CoreConfig;
use eauction_core::database::DatabaseManager;
use eauction_core::handlers::{self, AppState};
use eauction_core::live::LiveStateManager;
use eauction_core::scheduler::AuctionScheduler;
use eauction_core::store::{AuctionStore, BidStore, ItemStore, PaymentStore, UserStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 설정 로드
    let config = CoreConfig::from_env();

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(&config.durable_store_url).await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 라이브 상태 저장소 접속
    let live = Arc::new(
        LiveStateManager::new(&config.live_store_url, config.live_state_ttl_grace_seconds)
            .await
            .map_err(|e| {
                error!("{:<12} --> 라이브 저장소 접속 실패: {:?}", "Main", e);
                e
            })?,
    );
    info!("{:<12} --> 라이브 저장소 접속 성공", "Main");

    // 브로드캐스트 허브 생성
    let hub = Arc::new(BroadcastHub::new());

    // 엔티티 저장소 생성
    let pool = db_manager.get_pool();
    let auctions = AuctionStore::new(Arc::clone(&pool));
    let items = ItemStore::new(Arc::clone(&pool));
    let bids = BidStore::new(Arc::clone(&pool));
    let payments = PaymentStore::new(Arc::clone(&pool));
    let users = UserStore::new(pool);

    // 입찰 엔진 생성
    let engine = BidEngine::new(
        auctions.clone(),
        items,
        bids.clone(),
        users.clone(),
        Arc::clone(&live),
        Arc::clone(&hub),
    );

    // 라이프사이클 스케줄러 시작
    let scheduler = AuctionScheduler::new(
        Arc::clone(&db_manager),
        Arc::clone(&live),
        Arc::clone(&hub),
        config.clone(),
    );
    scheduler.start().await;

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let state = AppState {
        db: db_manager,
        auctions,
        bids,
        payments,
        users,
        live,
        hub,
        engine,
    };
    let routes_all = Router::new()
        .route("/api/auction/:id/bid", post(handlers::handle_place_bid))
        .route(
            "/api/auction/:id/state",
            get(handlers::handle_get_auction_state),
        )
        .route(
            "/api/auction/:id/bids",
            get(handlers::handle_get_recent_bids),
        )
        .route(
            "/bidder/payment/:id/pay",
            post(handlers::handle_pay_guarantee),
        )
        .route("/ws/auction/:id", get(handlers::handle_ws_auction))
        .route("/ws/auctions", get(handlers::handle_ws_updates))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20)) // 동시성을 위한 바디 사이즈 증가(20MB)
        .with_state(state);

    // 리스너 생성(로컬 호스트의 3000번 포트를 사용)
    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
