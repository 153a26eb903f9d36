use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::Mutex as P_Mutex;
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use uuid::Uuid;

use deck_sync_core::{HubEvent, HubRequest, RoomId, RoomRecord};

/// 一条 socket 连接一个订阅者标识
type SubscriberId = Uuid;

// 服务器全局状态
struct AppState {
    rooms: DashMap<RoomId, Arc<Room>>,
}

// 单个房间：持久化记录 + 当前订阅者集合。
// 频道对订阅者尽力而为送达，不保证跨发布者顺序；
// 记录无锁争用语义，最后写入者获胜。
// 严格规定使用锁的顺序，避免死锁：subscribers -> record
struct Room {
    record: P_Mutex<Option<RoomRecord>>,
    // 将订阅者标识映射到具体的网络连接
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<HubEvent>>>,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = SharedState::new(AppState {
        rooms: DashMap::new(),
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 25917));
    info!("中继服务器正在监听 {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<HubEvent>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = serde_json::to_string(&event).unwrap();
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接订阅的房间，在 Subscribe 成功后填充
    let mut context: Option<(RoomId, SubscriberId)> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<HubRequest>(&text) {
                Ok(request) => {
                    handle_request(request, state.clone(), &tx, &mut context).await;
                }
                Err(e) => {
                    // 畸形消息：丢弃，不影响任何房间状态
                    tracing::warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((room_id, subscriber_id)) = context {
        handle_disconnect(state, room_id, subscriber_id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_request(
    request: HubRequest,
    state: SharedState,
    tx: &mpsc::Sender<HubEvent>,
    context: &mut Option<(RoomId, SubscriberId)>,
) {
    match request {
        HubRequest::Subscribe { room_id } => {
            if context.is_some() {
                let _ = tx
                    .send(HubEvent::Error {
                        message: "你已经订阅了一个房间".to_string(),
                    })
                    .await;
                return;
            }

            let subscriber_id = Uuid::new_v4();
            let room = state
                .rooms
                .entry(room_id)
                .or_insert_with(|| {
                    Arc::new(Room {
                        record: P_Mutex::new(None),
                        subscribers: RwLock::new(HashMap::new()),
                    })
                })
                .clone();

            room.subscribers
                .write()
                .await
                .insert(subscriber_id, tx.clone());
            let record = room.record.lock().clone();

            info!("订阅者 {} 进入房间 {}", subscriber_id, room_id);
            *context = Some((room_id, subscriber_id));
            // 订阅确认随确认带上持久化记录，迟到者靠它追上进度
            let _ = tx.send(HubEvent::Subscribed { record }).await;
        }
        HubRequest::Publish(message) => {
            let Some((room_id, subscriber_id)) = context else {
                let _ = tx
                    .send(HubEvent::Error {
                        message: "请先订阅一个房间".to_string(),
                    })
                    .await;
                return;
            };
            let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else {
                return;
            };

            // 广播给房间内除发布者以外的所有订阅者
            let event = HubEvent::Broadcast(message);
            broadcast(
                room.subscribers.read().await.iter(),
                &event,
                Some(*subscriber_id),
            )
            .await;
        }
        HubRequest::PersistRecord(record) => {
            let Some((room_id, _)) = context else {
                return;
            };
            let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else {
                return;
            };
            // 无版本号、无比较：最后写入者的快照获胜
            *room.record.lock() = Some(record);
        }
        HubRequest::Unsubscribe => {
            if let Some((room_id, subscriber_id)) = context.take() {
                handle_disconnect(state, room_id, subscriber_id).await;
            }
        }
    }
}

/// 订阅者退订或断开后的处理
async fn handle_disconnect(state: SharedState, room_id: RoomId, subscriber_id: SubscriberId) {
    info!("订阅者 {} 离开房间 {}", subscriber_id, room_id);
    let room = match state.rooms.get(&room_id) {
        None => return,
        Some(r) => r.clone(),
    };

    let is_empty = {
        let mut subscribers = room.subscribers.write().await;
        subscribers.remove(&subscriber_id);
        subscribers.is_empty()
    };

    // 最后一个订阅者离开后移除房间（记录随之丢弃——持久性不在保证范围内）
    if is_empty {
        state.rooms.remove(&room_id);
        info!("房间 {} 已空，已被移除", room_id);
    }
}

/// 向房间内订阅者广播消息
async fn broadcast(
    subscribers: impl Iterator<Item = (&SubscriberId, &mpsc::Sender<HubEvent>)>,
    event: &HubEvent,
    exclude: Option<SubscriberId>,
) {
    for (subscriber_id, sender) in subscribers {
        if Some(*subscriber_id) == exclude {
            continue;
        }
        if sender.send(event.clone()).await.is_err() {
            // 发送失败，说明该订阅者也断开了，后续由其自己的 handle_socket 任务处理
            tracing::warn!("向订阅者 {} 发送消息失败（可能已断开）", subscriber_id);
        }
    }
}
