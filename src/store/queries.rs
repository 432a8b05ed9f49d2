/// 경매 조회
pub const GET_AUCTION: &str = "SELECT auction_id, item_id, start_time, end_time, status, min_increment_percent, current_highest_bid, winner_id, created_at, updated_at FROM auctions WHERE auction_id = $1";

/// 상태별 경매 조회
pub const LIST_AUCTIONS_BY_STATUS: &str = "SELECT auction_id, item_id, start_time, end_time, status, min_increment_percent, current_highest_bid, winner_id, created_at, updated_at FROM auctions WHERE status = $1 ORDER BY end_time";

/// 경매 저장 (last-write-wins)
pub const SAVE_AUCTION: &str = r#"
    INSERT INTO auctions (auction_id, item_id, start_time, end_time, status, min_increment_percent, current_highest_bid, winner_id, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (auction_id) DO UPDATE SET
        start_time = EXCLUDED.start_time,
        end_time = EXCLUDED.end_time,
        status = EXCLUDED.status,
        min_increment_percent = EXCLUDED.min_increment_percent,
        current_highest_bid = EXCLUDED.current_highest_bid,
        winner_id = EXCLUDED.winner_id,
        updated_at = EXCLUDED.updated_at
"#;

/// PENDING -> LIVE 전이 (이미 LIVE면 영향 없음)
pub const MARK_AUCTION_LIVE: &str =
    "UPDATE auctions SET status = 'LIVE', updated_at = now() WHERE auction_id = $1 AND status = 'PENDING'";

/// LIVE -> COMPLETED 전이 (낙찰자 포함)
pub const COMPLETE_AUCTION_WITH_WINNER: &str = "UPDATE auctions SET status = 'COMPLETED', winner_id = $2, current_highest_bid = $3, updated_at = now() WHERE auction_id = $1 AND status = 'LIVE'";

/// LIVE -> COMPLETED 전이 (무입찰)
pub const COMPLETE_AUCTION_WITHOUT_WINNER: &str =
    "UPDATE auctions SET status = 'COMPLETED', updated_at = now() WHERE auction_id = $1 AND status = 'LIVE'";

/// 낙찰자/최고가 갱신 (폴백)
pub const SET_AUCTION_WINNER: &str = "UPDATE auctions SET winner_id = $2, current_highest_bid = $3, updated_at = now() WHERE auction_id = $1";

/// 낙찰자/최고가 해제 (낙찰자 없음)
pub const CLEAR_AUCTION_WINNER: &str = "UPDATE auctions SET winner_id = NULL, current_highest_bid = NULL, updated_at = now() WHERE auction_id = $1";

/// 현재 최고가 기록 (입찰 수락 후)
pub const UPDATE_CURRENT_HIGHEST: &str =
    "UPDATE auctions SET current_highest_bid = $2, updated_at = now() WHERE auction_id = $1";

/// 상품 조회 (시작가)
pub const GET_ITEM: &str = "SELECT item_id, base_price FROM items WHERE item_id = $1";

/// 입찰 기록 추가 (수정/삭제 없음)
pub const APPEND_BID: &str =
    "INSERT INTO bids (bid_id, auction_id, bidder_id, amount, created_at) VALUES ($1, $2, $3, $4, $5)";

/// 입찰 이력 조회 (최근순)
pub const LIST_BIDS_DESC_BY_TIME: &str = r#"
    SELECT bid_id, auction_id, bidder_id, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY created_at DESC
"#;

/// 최고 입찰 조회
pub const TOP_BID: &str = r#"
    SELECT bid_id, auction_id, bidder_id, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC, created_at DESC
    LIMIT 1
"#;

/// 결제 저장
pub const SAVE_PAYMENT: &str = r#"
    INSERT INTO payments (payment_id, auction_id, bidder_id, amount, payment_type, status, due_by, paid_at, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

/// 결제 조회
pub const GET_PAYMENT: &str = "SELECT payment_id, auction_id, bidder_id, amount, payment_type, status, due_by, paid_at, created_at FROM payments WHERE payment_id = $1";

/// 미결 보증금 결제 조회 (스케줄러의 타임아웃 스캔)
pub const LIST_PENDING_GUARANTEES: &str = "SELECT payment_id, auction_id, bidder_id, amount, payment_type, status, due_by, paid_at, created_at FROM payments WHERE status = 'PENDING' AND payment_type = 'GUARANTEE'";

/// PENDING -> FAILED 전이 (이미 SUCCESS면 영향 없음)
pub const MARK_PAYMENT_FAILED: &str =
    "UPDATE payments SET status = 'FAILED' WHERE payment_id = $1 AND status = 'PENDING'";

/// PENDING -> SUCCESS 전이
pub const MARK_PAYMENT_SUCCESS: &str =
    "UPDATE payments SET status = 'SUCCESS', paid_at = $2 WHERE payment_id = $1 AND status = 'PENDING'";

/// 사용자 이름 조회
pub const GET_USER_NAME: &str = "SELECT name FROM users WHERE user_id = $1";
