//! 进程内传输实现
//!
//! 用 `tokio::sync::broadcast` 总线模拟房间频道，
//! 用共享的内存表模拟房间记录。供测试与单进程演示使用，
//! 语义与中继服务器一致：尽力而为、不回送给发布者自己、最后写入者获胜。

use crate::transport::{BroadcastChannel, RoomStore, TransportError};
use async_trait::async_trait;
use deck_sync_core::{ChannelMessage, RoomId, RoomRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// 每个房间一条总线，消息带上发布者标记以便接收端过滤自己
type Envelope = (u64, ChannelMessage);

const BUS_CAPACITY: usize = 64;

/// 进程内的"服务器"：所有房间的总线和记录表
pub struct MemoryHub {
    buses: Mutex<HashMap<RoomId, broadcast::Sender<Envelope>>>,
    records: Mutex<HashMap<RoomId, RoomRecord>>,
    next_tag: AtomicU64,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryHub {
            buses: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            next_tag: AtomicU64::new(1),
        })
    }

    /// 接入一个房间，返回一对已订阅的频道和记录读写口
    pub async fn connect(self: &Arc<Self>, room_id: RoomId) -> (MemoryChannel, MemoryStore) {
        let tx = {
            let mut buses = self.buses.lock().await;
            buses
                .entry(room_id)
                .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
                .clone()
        };
        let rx = tx.subscribe();
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);

        (
            MemoryChannel {
                tag,
                tx,
                rx: Some(rx),
            },
            MemoryStore {
                hub: Arc::clone(self),
                room_id,
            },
        )
    }
}

pub struct MemoryChannel {
    tag: u64,
    tx: broadcast::Sender<Envelope>,
    rx: Option<broadcast::Receiver<Envelope>>,
}

#[async_trait]
impl BroadcastChannel for MemoryChannel {
    async fn publish(&mut self, message: &ChannelMessage) -> Result<(), TransportError> {
        // 没有订阅者时发送会报错——尽力而为的频道把这当作正常情况
        let _ = self.tx.send((self.tag, message.clone()));
        Ok(())
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok((from, message)) if from != self.tag => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("频道积压，丢弃了 {} 条消息", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        self.rx = None;
        Ok(())
    }
}

pub struct MemoryStore {
    hub: Arc<MemoryHub>,
    room_id: RoomId,
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn fetch(&mut self) -> Result<Option<RoomRecord>, TransportError> {
        Ok(self.hub.records.lock().await.get(&self.room_id).cloned())
    }

    async fn persist(&mut self, record: &RoomRecord) -> Result<(), TransportError> {
        self.hub
            .records
            .lock()
            .await
            .insert(self.room_id, record.clone());
        Ok(())
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use deck_sync_core::actions;
    use uuid::Uuid;

    fn sample_message() -> ChannelMessage {
        let state = actions::initialize_deck(vec!["c1".into()], Uuid::new_v4(), 1);
        let action = state.last_action.clone().unwrap();
        ChannelMessage::CardAction { action, state }
    }

    #[tokio::test]
    async fn test_publisher_does_not_hear_itself() {
        let hub = MemoryHub::new();
        let room_id = Uuid::new_v4();
        let (mut a, _) = hub.connect(room_id).await;
        let (mut b, _) = hub.connect(room_id).await;

        a.publish(&sample_message()).await.unwrap();
        // b 能收到
        assert!(b.recv().await.is_some());
        // a 自己收不到，而且第二条消息不会被第一条挡住
        b.publish(&sample_message()).await.unwrap();
        assert!(a.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_recv_after_unsubscribe_returns_none() {
        let hub = MemoryHub::new();
        let room_id = Uuid::new_v4();
        let (mut a, _) = hub.connect(room_id).await;

        a.unsubscribe().await.unwrap();
        assert!(a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_record_last_writer_wins() {
        let hub = MemoryHub::new();
        let room_id = Uuid::new_v4();
        let (_, mut store_a) = hub.connect(room_id).await;
        let (_, mut store_b) = hub.connect(room_id).await;

        assert!(store_a.fetch().await.unwrap().is_none());

        let first = actions::initialize_deck(vec!["c1".into()], Uuid::new_v4(), 1);
        let second = actions::initialize_deck(vec!["c1".into(), "c2".into()], Uuid::new_v4(), 2);
        store_a.persist(&RoomRecord::new(first)).await.unwrap();
        store_b.persist(&RoomRecord::new(second)).await.unwrap();

        let record = store_a.fetch().await.unwrap().unwrap();
        let state = record.game_data.card_state.unwrap();
        assert_eq!(state.deck_cards.len(), 2);
    }
}
