/// 코어 에러 정의
/// 입찰 거절은 기계용 코드와 사람용 메시지를 함께 전달한다.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Bid Rejection

/// 입찰 거절 사유
/// 스크립트 페이로드(고정 소수점 문자열)를 그대로 담는다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidRejection {
    #[error("경매가 진행 중이 아닙니다.")]
    AuctionNotActive,
    #[error("경매가 이미 종료되었습니다.")]
    AuctionEnded,
    #[error("이미 최고 입찰자입니다. 다른 입찰자가 입찰할 때까지 기다려 주세요.")]
    SelfOutbid,
    #[error("첫 입찰 금액 {amount}은(는) 시작가 {required_base} 이상이어야 합니다.")]
    BelowBasePrice {
        amount: String,
        required_base: String,
    },
    #[error("입찰 금액은 현재 최고가 {current_highest} 기준 최소 {minimum_required} 이상이어야 합니다.")]
    BelowIncrement {
        current_highest: String,
        minimum_required: String,
    },
    #[error("입찰 금액은 0보다 커야 합니다.")]
    NonPositiveAmount,
}

impl BidRejection {
    /// 기계용 코드
    pub fn code(&self) -> &'static str {
        match self {
            BidRejection::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            BidRejection::AuctionEnded => "AUCTION_ENDED",
            BidRejection::SelfOutbid => "SELF_OUTBID",
            BidRejection::BelowBasePrice { .. } => "BELOW_BASE_PRICE",
            BidRejection::BelowIncrement { .. } => "BELOW_INCREMENT",
            BidRejection::NonPositiveAmount => "NON_POSITIVE_AMOUNT",
        }
    }

    /// 구조화된 응답 본문
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match self {
            BidRejection::BelowBasePrice {
                amount,
                required_base,
            } => {
                body["amount"] = serde_json::json!(amount);
                body["requiredBase"] = serde_json::json!(required_base);
            }
            BidRejection::BelowIncrement {
                current_highest,
                minimum_required,
            } => {
                body["currentHighest"] = serde_json::json!(current_highest);
                body["minimumRequired"] = serde_json::json!(minimum_required);
            }
            _ => {}
        }
        body
    }
}

// endregion: --- Bid Rejection

// region:    --- Core Error

/// 코어가 표면화하는 에러 종류
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    InvalidBid(#[from] BidRejection),
    #[error("결제 마감 시간이 지났습니다.")]
    PaymentExpired,
    #[error("{0}을(를) 찾을 수 없습니다.")]
    NotFound(&'static str),
    #[error("인증이 필요합니다.")]
    Unauthorized,
    #[error("저장소에 일시적으로 접근할 수 없습니다: {0}")]
    TransientUnavailable(String),
    #[error("동시 갱신 충돌: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::NotFound("레코드"),
            other => CoreError::TransientUnavailable(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        CoreError::TransientUnavailable(e.to_string())
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CoreError::InvalidBid(rejection) => (StatusCode::BAD_REQUEST, rejection.to_body()),
            CoreError::PaymentExpired => (
                StatusCode::CONFLICT,
                serde_json::json!({"error": self.to_string(), "code": "PAYMENT_EXPIRED"}),
            ),
            CoreError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": self.to_string(), "code": "NOT_FOUND"}),
            ),
            CoreError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({"error": self.to_string(), "code": "UNAUTHORIZED"}),
            ),
            CoreError::TransientUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({"error": self.to_string(), "code": "TRANSIENT_UNAVAILABLE"}),
            ),
            CoreError::Conflict(_) => (
                StatusCode::CONFLICT,
                serde_json::json!({"error": self.to_string(), "code": "CONFLICT"}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// endregion: --- Core Error

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_increment_message_contains_both_amounts() {
        let rejection = BidRejection::BelowIncrement {
            current_highest: "10000.00".to_string(),
            minimum_required: "11000.00".to_string(),
        };
        let message = rejection.to_string();
        assert!(message.contains("10000.00"));
        assert!(message.contains("11000.00"));
        assert_eq!(rejection.code(), "BELOW_INCREMENT");
    }

    #[test]
    fn test_below_base_price_body_payload() {
        let rejection = BidRejection::BelowBasePrice {
            amount: "8000.00".to_string(),
            required_base: "8500.00".to_string(),
        };
        let body = rejection.to_body();
        assert_eq!(body["code"], "BELOW_BASE_PRICE");
        assert_eq!(body["requiredBase"], "8500.00");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}

// endregion: --- Tests
