/// 브로드캐스트 허브
/// 경매별 토픽과 전역 토픽으로 상태 이벤트를 팬아웃한다.
/// 전달은 최선 노력이다. 늦게 구독한 쪽은 이전 이벤트를 받지 못하고,
/// 밀린 구독자는 이벤트를 건너뛴다. 클라이언트는 상태 조회로 재동기화한다.
// region:    --- Imports
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::auction::events::AuctionEvent;

// endregion: --- Imports

// region:    --- Topics

/// 경매별 토픽
pub fn auction_topic(auction_id: Uuid) -> String {
    format!("auction/{}", auction_id)
}

/// 경매 전체 라이프사이클 토픽
pub const UPDATES_TOPIC: &str = "auctions/updates";

// endregion: --- Topics

// region:    --- Broadcast Hub

/// 토픽별 채널 버퍼 크기
const TOPIC_CAPACITY: usize = 256;

/// 브로드캐스트 허브
pub struct BroadcastHub {
    topics: Mutex<HashMap<String, broadcast::Sender<AuctionEvent>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// 토픽 채널 확보 (없으면 생성)
    async fn sender(&self, topic: &str) -> broadcast::Sender<AuctionEvent> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// 이벤트 발행. 구독자 수를 반환하며 상태를 변경하지 않는다
    pub async fn publish(&self, topic: &str, event: AuctionEvent) -> usize {
        let sender = self.sender(topic).await;
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // 구독자가 없으면 이벤트는 그대로 버려진다
                debug!("{:<12} --> 구독자 없는 토픽: {}", "Broadcast", topic);
                0
            }
        }
    }

    /// 토픽 구독
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<AuctionEvent> {
        self.sender(topic).await.subscribe()
    }
}

// endregion: --- Broadcast Hub

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = BroadcastHub::new();
        let auction_id = Uuid::new_v4();
        let topic = auction_topic(auction_id);

        let mut rx = hub.subscribe(&topic).await;
        let delivered = hub
            .publish(
                &topic,
                AuctionEvent::AuctionStarted {
                    auction_id,
                    item_id: Uuid::new_v4(),
                },
            )
            .await;
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AuctionEvent::AuctionStarted { .. }));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_prior_events() {
        let hub = BroadcastHub::new();
        let auction_id = Uuid::new_v4();
        let topic = auction_topic(auction_id);

        hub.publish(&topic, AuctionEvent::AuctionNoWinner { auction_id })
            .await;

        // 발행 후 구독: 이전 이벤트는 보이지 않는다
        let mut rx = hub.subscribe(&topic).await;
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = BroadcastHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut rx_b = hub.subscribe(&auction_topic(b)).await;
        hub.publish(
            &auction_topic(a),
            AuctionEvent::AuctionNoWinner { auction_id: a },
        )
        .await;

        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}

// endregion: --- Tests
