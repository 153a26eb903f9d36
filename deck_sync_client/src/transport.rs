use async_trait::async_trait;
use deck_sync_core::{ChannelMessage, RoomRecord};
use thiserror::Error;

/// 传输层错误
///
/// 只在建立会话时向调用方暴露；本地动作成功之后的广播/持久化失败
/// 不会作为错误返回（本地状态已生效，见 [`crate::SyncSession`]）。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("连接失败: {0}")]
    Connect(String),
    #[error("发送失败: {0}")]
    Send(String),
    #[error("频道已关闭")]
    Closed,
}

/// 房间范围的广播频道
///
/// 尽力而为、对当前在线订阅者至少一次送达、
/// 跨发布者之间没有任何顺序保证。掉线的对等端收不到消息。
#[async_trait]
pub trait BroadcastChannel: Send {
    /// 向房间内其他订阅者发布一条消息（发后即忘）
    async fn publish(&mut self, message: &ChannelMessage) -> Result<(), TransportError>;

    /// 等待下一条入站广播；频道关闭或已退订时返回 None
    async fn recv(&mut self) -> Option<ChannelMessage>;

    /// 退订。离开房间时必须调用，
    /// 否则监听者会在参与者离开后继续覆写本地状态。
    async fn unsubscribe(&mut self) -> Result<(), TransportError>;
}

/// 房间持久化记录的读写口
///
/// 订阅时读一次，每次动作后写一次。无事务、无锁，
/// 最后写入者的快照获胜（与频道的"最后广播获胜"同一精神）。
#[async_trait]
pub trait RoomStore: Send {
    async fn fetch(&mut self) -> Result<Option<RoomRecord>, TransportError>;

    async fn persist(&mut self, record: &RoomRecord) -> Result<(), TransportError>;
}
