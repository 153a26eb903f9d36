//! 经中继服务器的 WebSocket 传输
//!
//! [`connect`] 完成订阅握手：发送 `Subscribe`，等到 `Subscribed` 确认，
//! 确认里携带的持久化房间记录暂存在 [`WsStore`] 中，
//! 由会话在进入房间时通过 `fetch` 取用。
//! 之后读半边归 [`WsChannel`]（入站广播），
//! 写半边由频道和记录口共享（发布与持久化都是发后即忘）。

use crate::transport::{BroadcastChannel, RoomStore, TransportError};
use async_trait::async_trait;
use deck_sync_core::{ChannelMessage, HubEvent, HubRequest, RoomId, RoomRecord};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsWrite = Arc<Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 连接中继服务器并订阅一个房间
pub async fn connect(url: &str, room_id: RoomId) -> Result<(WsChannel, WsStore), TransportError> {
    let url = Url::parse(url).map_err(|e| TransportError::Connect(e.to_string()))?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let (write, mut read) = ws_stream.split();
    let write = Arc::new(Mutex::new(write));

    send_request(&write, &HubRequest::Subscribe { room_id }).await?;

    // 等待订阅确认；确认里带着当前持久化的房间记录
    let record = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<HubEvent>(&text) {
                Ok(HubEvent::Subscribed { record }) => break record,
                Ok(HubEvent::Error { message }) => {
                    return Err(TransportError::Connect(message));
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("解析服务器消息失败: {}", e);
                    continue;
                }
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            None => return Err(TransportError::Closed),
        }
    };

    Ok((
        WsChannel {
            write: Arc::clone(&write),
            read,
        },
        WsStore { write, record },
    ))
}

async fn send_request(write: &WsWrite, request: &HubRequest) -> Result<(), TransportError> {
    let payload =
        serde_json::to_string(request).map_err(|e| TransportError::Send(e.to_string()))?;
    write
        .lock()
        .await
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| TransportError::Send(e.to_string()))
}

pub struct WsChannel {
    write: WsWrite,
    read: WsRead,
}

#[async_trait]
impl BroadcastChannel for WsChannel {
    async fn publish(&mut self, message: &ChannelMessage) -> Result<(), TransportError> {
        send_request(&self.write, &HubRequest::Publish(message.clone())).await
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        while let Some(frame) = self.read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<HubEvent>(&text) {
                    Ok(HubEvent::Broadcast(message)) => return Some(message),
                    Ok(HubEvent::Error { message }) => {
                        tracing::warn!("服务器错误: {}", message);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // 畸形入站消息：忽略，保留本地状态
                        tracing::warn!("解析服务器消息失败: {}", e);
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("接收消息时出错: {}", e);
                    return None;
                }
            }
        }
        None
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        send_request(&self.write, &HubRequest::Unsubscribe).await
    }
}

pub struct WsStore {
    write: WsWrite,
    /// 订阅握手时服务器返回的记录
    record: Option<RoomRecord>,
}

#[async_trait]
impl RoomStore for WsStore {
    async fn fetch(&mut self) -> Result<Option<RoomRecord>, TransportError> {
        Ok(self.record.clone())
    }

    async fn persist(&mut self, record: &RoomRecord) -> Result<(), TransportError> {
        send_request(&self.write, &HubRequest::PersistRecord(record.clone())).await
    }
}
