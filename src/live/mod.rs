/// 라이브 상태 저장소(Redis) 어댑터
/// 경매별 핫 상태와 서버측 원자 스크립트를 담당한다.
/// 같은 경매에 대한 입찰 허가와 헤드 제거는 스크립트 안에서만 일어나므로
/// 분산 락 없이 경매 단위 선형성이 보장된다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::auction::model::{Auction, Bid};
use crate::bidding::model::BidEnvelope;
use crate::error::CoreError;

// endregion: --- Imports

// region:    --- Key Schema

/// 라이브 저장소 키 스키마
/// 여러 프로세스가 합의해야 하는 권위 있는 문자열이다.
pub fn state_key(auction_id: Uuid) -> String {
    format!("auction:{}:state", auction_id)
}

pub fn highest_key(auction_id: Uuid) -> String {
    format!("auction:{}:highest", auction_id)
}

pub fn bids_key(auction_id: Uuid) -> String {
    format!("auction:{}:bids", auction_id)
}

// endregion: --- Key Schema

// region:    --- Lua Scripts

/// 입찰 허가 스크립트
/// 첫 입찰은 시작가, 이후 입찰은 인상률 규칙을 검사한 뒤
/// highest / 정렬 집합 / 상태 해시를 한 번에 갱신한다.
const ADMIT_BID_LUA: &str = r#"
local currentHighest = tonumber(redis.call('GET', KEYS[1]) or '0')
local newBid = tonumber(ARGV[1])
local basePrice = tonumber(ARGV[4])
local incrementPercent = tonumber(ARGV[5])

if currentHighest == 0 then
    if newBid < basePrice then
        return '-3:' .. string.format('%.2f', basePrice)
    end
else
    local minimumRequired = currentHighest * (1 + incrementPercent / 100)
    if newBid < minimumRequired then
        return '-1:' .. string.format('%.2f', currentHighest)
               .. ':' .. string.format('%.2f', minimumRequired)
    end
end

redis.call('SET', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], newBid, ARGV[2])
redis.call('HSET', KEYS[3], 'highestBid', ARGV[1])
redis.call('HSET', KEYS[3], 'highestBidder', ARGV[3])

return '1'
"#;

/// 헤드 제거 스크립트 (결제 폴백)
/// 최상위 입찰을 빼고 다음 입찰 봉투에서 highest / 상태 해시를
/// 같은 스크립트 안에서 복원한다. 남은 입찰이 없으면 빈 문자열 반환.
const REMOVE_HEAD_LUA: &str = r#"
local top = redis.call('ZREVRANGE', KEYS[1], 0, 0)
if #top > 0 then
    redis.call('ZREM', KEYS[1], top[1])
end

local newTop = redis.call('ZREVRANGE', KEYS[1], 0, 0)
if #newTop == 0 then
    redis.call('SET', KEYS[2], '0')
    redis.call('HSET', KEYS[3], 'highestBid', '0')
    redis.call('HSET', KEYS[3], 'highestBidder', '')
    return ''
end

local record = cjson.decode(newTop[1])
redis.call('SET', KEYS[2], record.amount)
redis.call('HSET', KEYS[3], 'highestBid', record.amount)
redis.call('HSET', KEYS[3], 'highestBidder', record.bidderId)
return newTop[1]
"#;

// endregion: --- Lua Scripts

// region:    --- Live State

/// 상태 해시의 타입 있는 투영
#[derive(Debug, Clone)]
pub struct LiveAuctionState {
    pub status: String,
    pub item_id: String,
    pub end_time: Option<DateTime<Utc>>,
    pub highest_bid: Decimal,
    pub highest_bidder: Option<Uuid>,
}

impl LiveAuctionState {
    fn from_hash(map: HashMap<String, String>) -> Option<Self> {
        if map.is_empty() {
            return None;
        }
        let highest_bidder = map
            .get("highestBidder")
            .filter(|s| !s.is_empty())
            .and_then(|s| Uuid::parse_str(s).ok());
        Some(Self {
            status: map.get("status").cloned().unwrap_or_default(),
            item_id: map.get("itemId").cloned().unwrap_or_default(),
            end_time: map
                .get("endTime")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            highest_bid: map
                .get("highestBid")
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO),
            highest_bidder,
        })
    }
}

// endregion: --- Live State

// region:    --- Live State Manager

/// 접속 단위 마감 시간. 초과 시 TransientUnavailable로 표면화된다.
const LIVE_STORE_DEADLINE: Duration = Duration::from_millis(500);

/// 라이브 상태 매니저
pub struct LiveStateManager {
    conn: ConnectionManager,
    ttl_grace_seconds: i64,
    admit_script: redis::Script,
    remove_head_script: redis::Script,
}

impl LiveStateManager {
    /// 라이브 저장소 접속
    pub async fn new(live_store_url: &str, ttl_grace_seconds: i64) -> Result<Self, CoreError> {
        let client = redis::Client::open(live_store_url)
            .map_err(|e| CoreError::TransientUnavailable(e.to_string()))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            ttl_grace_seconds,
            admit_script: redis::Script::new(ADMIT_BID_LUA),
            remove_head_script: redis::Script::new(REMOVE_HEAD_LUA),
        })
    }

    /// 마감 시간이 걸린 호출
    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, CoreError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(LIVE_STORE_DEADLINE, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CoreError::TransientUnavailable(
                "라이브 저장소 응답 시간 초과".to_string(),
            )),
        }
    }

    /// 경매가 라이브 저장소에 투영되어 있는지 (프로세스 로컬 집합 대신
    /// 저장소 자체에 대한 존재 검사를 쓴다)
    pub async fn is_projected(&self, auction_id: Uuid) -> Result<bool, CoreError> {
        let mut conn = self.conn.clone();
        self.with_deadline(async move { conn.exists(state_key(auction_id)).await })
            .await
    }

    /// 경매를 라이브 저장소에 투영
    /// 영속 저장소의 입찰 이력까지 정렬 집합에 적재하므로
    /// 라이브 저장소가 비워진 뒤에도 복구된다.
    pub async fn project_auction(&self, auction: &Auction, bids: &[Bid]) -> Result<(), CoreError> {
        let seeded_highest = auction.current_highest_bid.unwrap_or(Decimal::ZERO);
        let highest_bidder = auction
            .winner_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let ttl = self.ttl_seconds(auction.end_time, Utc::now());

        let state = state_key(auction.auction_id);
        let highest = highest_key(auction.auction_id);
        let bid_set = bids_key(auction.auction_id);

        let fields: Vec<(&str, String)> = vec![
            ("status", "LIVE".to_string()),
            ("itemId", auction.item_id.to_string()),
            ("startTime", auction.start_time.to_rfc3339()),
            ("endTime", auction.end_time.to_rfc3339()),
            ("highestBid", seeded_highest.to_string()),
            ("highestBidder", highest_bidder),
        ];

        let mut conn = self.conn.clone();
        self.with_deadline(async {
            let _: () = conn.hset_multiple(&state, &fields).await?;
            let _: () = conn.set(&highest, seeded_highest.to_string()).await?;
            for bid in bids {
                let envelope = BidEnvelope::from(bid);
                let member = envelope.to_json().map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::TypeError,
                        "bid envelope encode",
                        e.to_string(),
                    ))
                })?;
                let score = envelope.amount.to_f64().unwrap_or(0.0);
                let _: () = conn.zadd(&bid_set, member, score).await?;
            }
            let _: () = conn.expire(&state, ttl).await?;
            let _: () = conn.expire(&highest, ttl).await?;
            let _: () = conn.expire(&bid_set, ttl).await?;
            Ok(())
        })
        .await
    }

    fn ttl_seconds(&self, end_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        ttl_seconds(end_time, self.ttl_grace_seconds, now)
    }

    /// 상태 해시 조회. 투영이 없으면 None
    pub async fn get_state(&self, auction_id: Uuid) -> Result<Option<LiveAuctionState>, CoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = self
            .with_deadline(async move { conn.hgetall(state_key(auction_id)).await })
            .await?;
        Ok(LiveAuctionState::from_hash(map))
    }

    /// 현재 최고가 조회 (없으면 0)
    pub async fn current_highest(&self, auction_id: Uuid) -> Result<Decimal, CoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .with_deadline(async move { conn.get(highest_key(auction_id)).await })
            .await?;
        Ok(raw
            .filter(|s| !s.is_empty())
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or(Decimal::ZERO))
    }

    /// 현재 최고 입찰자 조회
    pub async fn highest_bidder(&self, auction_id: Uuid) -> Result<Option<Uuid>, CoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .with_deadline(async move { conn.hget(state_key(auction_id), "highestBidder").await })
            .await?;
        Ok(raw
            .filter(|s| !s.is_empty())
            .and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// 최근 입찰 조회 (높은 금액부터)
    pub async fn recent_bids(
        &self,
        auction_id: Uuid,
        count: usize,
    ) -> Result<Vec<BidEnvelope>, CoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = self
            .with_deadline(async move {
                conn.zrevrange(bids_key(auction_id), 0, count as isize - 1)
                    .await
            })
            .await?;
        let mut envelopes = Vec::with_capacity(raw.len());
        for member in raw {
            match BidEnvelope::from_json(&member) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => warn!(
                    "{:<12} --> 입찰 봉투 파싱 실패: {} ({})",
                    "LiveStore", e, member
                ),
            }
        }
        Ok(envelopes)
    }

    /// 입찰 수 조회
    pub async fn bid_count(&self, auction_id: Uuid) -> Result<u64, CoreError> {
        let mut conn = self.conn.clone();
        self.with_deadline(async move { conn.zcard(bids_key(auction_id)).await })
            .await
    }

    /// 원자 입찰 허가 스크립트 실행
    /// 반환: "1" 수락, "-1:<현재>:<최소>" 인상률 미달, "-3:<시작가>" 시작가 미달
    pub async fn admit_bid(
        &self,
        auction_id: Uuid,
        amount: Decimal,
        envelope_json: &str,
        bidder_id: Uuid,
        base_price: Decimal,
        increment_percent: Decimal,
    ) -> Result<String, CoreError> {
        let mut conn = self.conn.clone();
        self.with_deadline(async {
            self.admit_script
                .key(highest_key(auction_id))
                .key(bids_key(auction_id))
                .key(state_key(auction_id))
                .arg(amount.to_string())
                .arg(envelope_json)
                .arg(bidder_id.to_string())
                .arg(base_price.to_string())
                .arg(increment_percent.to_string())
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    /// 헤드 제거 (결제 폴백). 새 헤드 봉투 또는 None 반환
    pub async fn remove_head(&self, auction_id: Uuid) -> Result<Option<BidEnvelope>, CoreError> {
        let mut conn = self.conn.clone();
        let raw: String = self
            .with_deadline(async {
                self.remove_head_script
                    .key(bids_key(auction_id))
                    .key(highest_key(auction_id))
                    .key(state_key(auction_id))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        if raw.is_empty() {
            return Ok(None);
        }
        let envelope = BidEnvelope::from_json(&raw).map_err(|e| {
            CoreError::TransientUnavailable(format!("헤드 봉투 파싱 실패: {}", e))
        })?;
        Ok(Some(envelope))
    }

    /// 라이브 상태 해제 (완료/낙찰자 없음)
    pub async fn deactivate(&self, auction_id: Uuid) -> Result<(), CoreError> {
        let mut conn = self.conn.clone();
        self.with_deadline(async move {
            let _: () = conn
                .del(&[
                    state_key(auction_id),
                    highest_key(auction_id),
                    bids_key(auction_id),
                ])
                .await?;
            Ok(())
        })
        .await
    }
}

/// TTL 계산: 종료 시각 + 여유 시간 - 현재, 최소 60초
pub fn ttl_seconds(end_time: DateTime<Utc>, grace_seconds: i64, now: DateTime<Utc>) -> i64 {
    let remaining = (end_time - now).num_seconds() + grace_seconds;
    remaining.max(60)
}

// endregion: --- Live State Manager

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_schema() {
        let id = Uuid::nil();
        assert_eq!(
            state_key(id),
            "auction:00000000-0000-0000-0000-000000000000:state"
        );
        assert_eq!(
            highest_key(id),
            "auction:00000000-0000-0000-0000-000000000000:highest"
        );
        assert_eq!(
            bids_key(id),
            "auction:00000000-0000-0000-0000-000000000000:bids"
        );
    }

    #[test]
    fn test_state_from_hash_empty_is_none() {
        assert!(LiveAuctionState::from_hash(HashMap::new()).is_none());
    }

    #[test]
    fn test_state_from_hash_parses_fields() {
        let bidder = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert("status".to_string(), "LIVE".to_string());
        map.insert("itemId".to_string(), Uuid::nil().to_string());
        map.insert("endTime".to_string(), "2025-03-01T12:00:00+00:00".to_string());
        map.insert("highestBid".to_string(), "9350.00".to_string());
        map.insert("highestBidder".to_string(), bidder.to_string());

        let state = LiveAuctionState::from_hash(map).unwrap();
        assert_eq!(state.status, "LIVE");
        assert_eq!(state.highest_bid.to_string(), "9350.00");
        assert_eq!(state.highest_bidder, Some(bidder));
        assert!(state.end_time.is_some());
    }

    #[test]
    fn test_state_from_hash_blank_bidder_is_none() {
        let mut map = HashMap::new();
        map.insert("status".to_string(), "LIVE".to_string());
        map.insert("highestBidder".to_string(), String::new());
        let state = LiveAuctionState::from_hash(map).unwrap();
        assert!(state.highest_bidder.is_none());
    }

    #[test]
    fn test_ttl_floor_is_sixty_seconds() {
        let now = Utc::now();
        // 이미 종료된 경매라도 최소 60초는 유지한다
        assert_eq!(ttl_seconds(now - chrono::Duration::hours(2), 0, now), 60);
        // 남은 시간 + 여유 시간
        let ttl = ttl_seconds(now + chrono::Duration::hours(1), 3600, now);
        assert!((7199..=7200).contains(&ttl));
    }

    #[test]
    fn test_admit_script_formats_payload_to_two_places() {
        // 스크립트 페이로드는 고정 2자리 문자열이어야 에러 메시지가 정확하다
        assert!(ADMIT_BID_LUA.contains("string.format('%.2f', currentHighest)"));
        assert!(ADMIT_BID_LUA.contains("string.format('%.2f', minimumRequired)"));
        assert!(ADMIT_BID_LUA.contains("string.format('%.2f', basePrice)"));
    }
}

// endregion: --- Tests
