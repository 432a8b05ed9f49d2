// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auction::model::Bid;

// endregion: --- Imports

// region:    --- Bid Envelope

/// 라이브 정렬 집합에 저장되고 이벤트로 내보내지는 입찰 레코드 봉투
/// 생산자와 소비자가 필드 구성, 소수점 표기, 타임스탬프 직렬화에 합의하는
/// 타입 코덱이다. 모든 레코드는 bidId를 포함한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEnvelope {
    pub bid_id: Uuid,
    pub bidder_id: Uuid,
    pub amount: Decimal,
    pub ts: DateTime<Utc>,
}

impl BidEnvelope {
    /// JSON 직렬화 (정렬 집합 멤버 문자열)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// JSON 역직렬화
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl From<&Bid> for BidEnvelope {
    fn from(bid: &Bid) -> Self {
        Self {
            bid_id: bid.bid_id,
            bidder_id: bid.bidder_id,
            amount: fixed2(bid.amount),
            ts: bid.created_at,
        }
    }
}

/// 소수점 2자리 고정 표기로 정규화
/// 금액 컬럼은 2자리 고정이므로 손실 없는 변환이다.
pub fn fixed2(amount: Decimal) -> Decimal {
    let mut normalized = amount;
    normalized.rescale(2);
    normalized
}

// endregion: --- Bid Envelope

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_round_trip_exact_amount() {
        let envelope = BidEnvelope {
            bid_id: Uuid::new_v4(),
            bidder_id: Uuid::new_v4(),
            amount: dec!(10285.00),
            ts: "2025-03-01T12:00:00Z".parse().unwrap(),
        };
        let json = envelope.to_json().unwrap();
        // 금액은 고정 소수점 문자열로 실린다
        assert!(json.contains("\"amount\":\"10285.00\""));
        let back = BidEnvelope::from_json(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_envelope_field_names() {
        let envelope = BidEnvelope {
            bid_id: Uuid::nil(),
            bidder_id: Uuid::nil(),
            amount: dec!(8500.00),
            ts: Utc::now(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("bidId").is_some());
        assert!(value.get("bidderId").is_some());
        assert!(value.get("amount").is_some());
        assert!(value.get("ts").is_some());
    }

    #[test]
    fn test_fixed2_normalizes_scale() {
        assert_eq!(fixed2(dec!(8500)).to_string(), "8500.00");
        assert_eq!(fixed2(dec!(9350.5)).to_string(), "9350.50");
        assert_eq!(fixed2(dec!(5142.50)).to_string(), "5142.50");
    }
}

// endregion: --- Tests
