/// 코어 설정
/// 환경 변수만 읽는다. 여기에 없는 변수는 코어 동작에 영향을 주지 않는다.
// region:    --- Imports
use rust_decimal::Decimal;
use std::str::FromStr;

// endregion: --- Imports

// region:    --- Config

/// 경매 코어 설정값
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// 라이브 상태 저장소(Redis) 접속 URL
    pub live_store_url: String,
    /// 영속 저장소(PostgreSQL) 접속 URL
    pub durable_store_url: String,
    /// 라이프사이클 스케줄러 주기(ms)
    pub scheduler_tick_ms: u64,
    /// 보증금 결제 제한 시간(분)
    pub payment_window_minutes: i64,
    /// 기본 최소 인상률(%)
    pub default_min_increment_percent: Decimal,
    /// 라이브 상태 TTL 여유 시간(초)
    pub live_state_ttl_grace_seconds: i64,
}

impl CoreConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        Self {
            live_store_url: std::env::var("LIVE_STORE_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string()),
            durable_store_url: std::env::var("DURABLE_STORE_URL")
                .expect("DURABLE_STORE_URL must be set"),
            scheduler_tick_ms: env_parsed("SCHEDULER_TICK_MS", 2000),
            payment_window_minutes: env_parsed("PAYMENT_WINDOW_MINUTES", 5),
            default_min_increment_percent: env_parsed(
                "DEFAULT_MIN_INCREMENT_PERCENT",
                Decimal::new(1000, 2),
            ),
            live_state_ttl_grace_seconds: env_parsed("LIVE_STATE_TTL_GRACE_SECONDS", 3600),
        }
    }
}

/// 환경 변수 파싱(없거나 파싱 불가 시 기본값)
fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// endregion: --- Config

// region:    --- Tests


// endregion: --- Tests
