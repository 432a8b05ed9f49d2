/// 요청 파사드
/// HTTP / WebSocket 경계. 상태를 직접 바꾸지 않고 엔진과 저장소에 위임한다.
/// 인증은 상류에서 끝났다고 가정하고 X-Bidder-Id 헤더로 신원을 받는다.
// region:    --- Imports
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auction::events::AuctionEvent;
use crate::auction::model::{AuctionStatus, PaymentStatus};
use crate::bidding::commands::minimum_next_bid;
use crate::bidding::model::fixed2;
use crate::bidding::BidEngine;
use crate::broadcast::{auction_topic, BroadcastHub, UPDATES_TOPIC};
use crate::database::DatabaseManager;
use crate::error::CoreError;
use crate::live::LiveStateManager;
use crate::store::{AuctionStore, BidStore, PaymentStore, UserStore};

// endregion: --- Imports

// region:    --- App State

/// 라우터 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub auctions: AuctionStore,
    pub bids: BidStore,
    pub payments: PaymentStore,
    pub users: UserStore,
    pub live: Arc<LiveStateManager>,
    pub hub: Arc<BroadcastHub>,
    pub engine: BidEngine,
}

/// 상류 인증 계층이 채워주는 입찰자 신원 헤더
const BIDDER_HEADER: &str = "x-bidder-id";

/// 헤더에서 입찰자 신원 추출
fn bidder_from_headers(headers: &HeaderMap) -> Result<Uuid, CoreError> {
    headers
        .get(BIDDER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or(CoreError::Unauthorized)
}

// endregion: --- App State

// region:    --- Command Handlers

/// 입찰 요청 본문
#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: String,
}

/// 입찰 요청 처리
pub async fn handle_place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let bidder_id = bidder_from_headers(&headers)?;
    info!(
        "{:<12} --> 입찰 요청: auction={}, bidder={}, amount={}",
        "Command", auction_id, bidder_id, request.amount
    );

    let Ok(amount) = Decimal::from_str(&request.amount) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "금액 형식이 올바르지 않습니다.",
                "code": "INVALID_AMOUNT"
            })),
        )
            .into_response());
    };

    let bid = state.engine.place_bid(auction_id, bidder_id, amount).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "bidId": bid.bid_id
    }))
    .into_response())
}

/// 보증금 결제 처리
/// 마감 안의 PENDING 결제만 SUCCESS로 전이한다.
/// 스케줄러가 먼저 FAILED 처리했다면 마감 초과로 응답한다.
pub async fn handle_pay_guarantee(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, CoreError> {
    let bidder_id = bidder_from_headers(&headers)?;
    info!(
        "{:<12} --> 보증금 결제 요청: payment={}, bidder={}",
        "Command", payment_id, bidder_id
    );

    let payment = state
        .payments
        .get(payment_id)
        .await?
        .filter(|p| p.bidder_id == bidder_id)
        .ok_or(CoreError::NotFound("결제"))?;

    if payment.status != PaymentStatus::Pending {
        return Err(CoreError::NotFound("결제"));
    }
    if let Some(due_by) = payment.due_by {
        if Utc::now() > due_by {
            return Err(CoreError::PaymentExpired);
        }
    }

    let paid = state.payments.mark_success(payment_id, Utc::now()).await?;
    if !paid {
        // PENDING 조건에 걸리지 않았다면 스케줄러의 FAILED 전이가 먼저였다
        return Err(CoreError::Conflict(
            "결제가 이미 다른 상태로 전이되었습니다.".to_string(),
        ));
    }

    // 결제 완료로 라이브 상태는 수명을 다했다
    if let Err(e) = state.live.deactivate(payment.auction_id).await {
        warn!(
            "{:<12} --> 경매 {} 라이브 상태 해제 실패: {:?}",
            "Command", payment.auction_id, e
        );
    }

    let bidder_name = state
        .users
        .find_name(bidder_id)
        .await
        .unwrap_or_default()
        .unwrap_or_default();
    state
        .hub
        .publish(
            &auction_topic(payment.auction_id),
            AuctionEvent::PaymentCompleted {
                auction_id: payment.auction_id,
                bidder_id,
                bidder_name,
            },
        )
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("보증금 {} 결제가 완료되었습니다.", fixed2(payment.amount))
    })))
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 상태 조회
/// 라이브 저장소가 권위지만, 완료된 경매나 라이브 장애 시에는
/// 영속 저장소의 뷰로 대체한다.
pub async fn handle_get_auction_state(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> Result<impl IntoResponse, CoreError> {
    info!("{:<12} --> 경매 상태 조회 id: {}", "HandlerQuery", auction_id);
    let auction = state
        .auctions
        .get(auction_id)
        .await?
        .ok_or(CoreError::NotFound("경매"))?;

    // 라이브 저장소 조회. 장애 시 영속 뷰로 폴백한다
    let live_view = async {
        let highest = state.live.current_highest(auction_id).await?;
        let bidder = state.live.highest_bidder(auction_id).await?;
        let count = state.live.bid_count(auction_id).await?;
        Ok::<_, CoreError>((highest, bidder, count))
    }
    .await;

    let (mut highest, mut highest_bidder, mut bid_count) = match live_view {
        Ok(view) => view,
        Err(e) => {
            warn!(
                "{:<12} --> 라이브 저장소 조회 실패, 영속 뷰 사용: {:?}",
                "HandlerQuery", e
            );
            (Decimal::ZERO, None, 0)
        }
    };
    let mut minimum = minimum_next_bid(highest, auction.min_increment_percent);

    // 완료된 경매는 라이브 상태가 만료되었을 수 있다
    if highest == Decimal::ZERO {
        if let Some(durable_highest) = auction.current_highest_bid {
            highest = durable_highest;
            if auction.status == AuctionStatus::Completed {
                minimum = Decimal::ZERO;
            } else {
                minimum = minimum_next_bid(highest, auction.min_increment_percent);
            }
        }
    }
    if highest_bidder.is_none() {
        highest_bidder = auction.winner_id;
    }
    if bid_count == 0 {
        bid_count = state.bids.list_desc_by_time(auction_id).await?.len() as u64;
    }

    let bidder_name = match highest_bidder {
        Some(id) => state.users.find_name(id).await?.unwrap_or_default(),
        None => String::new(),
    };

    // 완료된 경매의 차순위 입찰자 (알림용)
    let mut second_bidder_id = String::new();
    let mut second_bidder_name = String::new();
    if auction.status == AuctionStatus::Completed {
        if let Some(winner_id) = auction.winner_id {
            let mut all_bids = state.bids.list_desc_by_time(auction_id).await?;
            all_bids.sort_by(|a, b| b.amount.cmp(&a.amount));
            if let Some(second) = all_bids.iter().find(|bid| bid.bidder_id != winner_id) {
                second_bidder_id = second.bidder_id.to_string();
                second_bidder_name = state
                    .users
                    .find_name(second.bidder_id)
                    .await?
                    .unwrap_or_default();
            }
        }
    }

    let mut body = serde_json::json!({
        "status": auction.status,
        "currentHighest": fixed2(highest),
        "minimumBid": fixed2(minimum),
        "highestBidder": highest_bidder.map(|id| id.to_string()).unwrap_or_default(),
        "highestBidderName": bidder_name,
        "bidCount": bid_count,
        "endTime": auction.end_time,
        "secondBidderId": second_bidder_id,
        "secondBidderName": second_bidder_name,
    });
    if let Some(winner_id) = auction.winner_id {
        body["winnerId"] = serde_json::json!(winner_id);
    }
    Ok(Json(body))
}

/// 최근 입찰 조회 질의
#[derive(Debug, Deserialize)]
pub struct RecentBidsQuery {
    pub limit: Option<usize>,
}

/// 최근 입찰 조회 (높은 금액부터)
/// 라이브 봉투가 비어 있으면 (만료된 완료 경매) 영속 이력으로 대체한다.
pub async fn handle_get_recent_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
    Query(query): Query<RecentBidsQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let limit = query.limit.unwrap_or(20);
    info!(
        "{:<12} --> 입찰 이력 조회 id: {}, limit: {}",
        "HandlerQuery", auction_id, limit
    );

    let envelopes = match state.engine.recent_bids(auction_id, limit).await {
        Ok(envelopes) => envelopes,
        Err(e) => {
            warn!(
                "{:<12} --> 라이브 입찰 조회 실패, 영속 이력 사용: {:?}",
                "HandlerQuery", e
            );
            Vec::new()
        }
    };

    let mut rows = Vec::with_capacity(limit);
    if envelopes.is_empty() {
        for bid in state
            .bids
            .list_desc_by_time(auction_id)
            .await?
            .into_iter()
            .take(limit)
        {
            rows.push(serde_json::json!({
                "bidderId": bid.bidder_id,
                "bidderName": resolve_name(&state.users, bid.bidder_id).await,
                "amount": fixed2(bid.amount),
                "ts": bid.created_at,
            }));
        }
    } else {
        for envelope in envelopes {
            rows.push(serde_json::json!({
                "bidderId": envelope.bidder_id,
                "bidderName": resolve_name(&state.users, envelope.bidder_id).await,
                "amount": envelope.amount,
                "ts": envelope.ts,
            }));
        }
    }
    Ok(Json(rows))
}

/// 표시 이름 조회 (없거나 실패하면 "알 수 없음")
async fn resolve_name(users: &UserStore, user_id: Uuid) -> String {
    match users.find_name(user_id).await {
        Ok(Some(name)) => name,
        _ => "알 수 없음".to_string(),
    }
}

// endregion: --- Query Handlers

// region:    --- WebSocket Handlers

/// 경매별 토픽 구독
pub async fn handle_ws_auction(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(auction_id): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_topic(socket, state, auction_topic(auction_id)))
}

/// 전역 라이프사이클 토픽 구독
pub async fn handle_ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_topic(socket, state, UPDATES_TOPIC.to_string()))
}

/// 토픽 이벤트를 소켓으로 중계
/// 밀린 구독자는 놓친 이벤트를 건너뛰고 계속 받는다.
/// 클라이언트는 재접속 시 상태 조회로 재동기화한다.
async fn stream_topic(mut socket: WebSocket, state: AppState, topic: String) {
    let mut rx = state.hub.subscribe(&topic).await;
    info!("{:<12} --> 구독 시작: {}", "WebSocket", topic);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "{:<12} --> 구독자가 {}건 밀렸습니다: {}",
                            "WebSocket", skipped, topic
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("{:<12} --> 구독 종료: {}", "WebSocket", topic);
}

// endregion: --- WebSocket Handlers
