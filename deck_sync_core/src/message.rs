use crate::deck::now_millis;
use crate::state::{ActionRecord, RoomId, SyncedGameState};
use serde::{Deserialize, Serialize};

// --- 广播频道上的消息 ---

/// 频道消息信封，序列化为
/// `{ "type": "card_action", "payload": { "action": …, "state": … } }`。
///
/// 没有应答、没有请求/响应——发后即忘。
/// 快照是整份发送的，不发增量。
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelMessage {
    CardAction {
        action: ActionRecord,
        state: SyncedGameState,
    },
}

// --- 房间持久化记录 ---

/// 按房间标识作为键的持久化文档
///
/// 频道之外的兜底读取路径：订阅时读一次用于迟到者/重连者追赶，
/// 每次动作后写一次。无锁、无版本号，最后写入者获胜。
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RoomRecord {
    pub game_data: GameData,
    /// epoch 毫秒
    pub updated_at: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GameData {
    #[serde(rename = "cardState")]
    pub card_state: Option<SyncedGameState>,
}

impl RoomRecord {
    /// 用当前快照构造一条带时间戳的记录
    pub fn new(state: SyncedGameState) -> Self {
        RoomRecord {
            game_data: GameData {
                card_state: Some(state),
            },
            updated_at: now_millis(),
        }
    }
}

// --- 客户端 -> 中继服务器 的消息 ---
// 中继服务器同时提供两个外部协作者：房间范围的广播频道和持久化房间记录。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum HubRequest {
    /// 订阅一个房间的频道
    Subscribe { room_id: RoomId },
    /// 向房间内其他订阅者广播一条消息
    Publish(ChannelMessage),
    /// 尽力持久化房间记录（无应答，最后写入者获胜）
    PersistRecord(RoomRecord),
    /// 退订（离开房间时必须发送，避免监听者泄漏）
    Unsubscribe,
}

// --- 中继服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum HubEvent {
    /// 订阅确认，随确认带上当前持久化的房间记录（可能还没有）
    Subscribed { record: Option<RoomRecord> },
    /// 房间内其他订阅者发布的消息
    Broadcast(ChannelMessage),
    /// 服务器向特定客户端发送错误信息
    Error { message: String },
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions;
    use uuid::Uuid;

    #[test]
    fn test_envelope_wire_shape() {
        // 钉死线上格式：{"type":"card_action","payload":{...}}
        let player = Uuid::new_v4();
        let state = actions::initialize_deck(vec!["c1".into(), "c2".into()], player, 5);
        let action = state.last_action.clone().unwrap();

        let message = ChannelMessage::CardAction {
            action,
            state: state.clone(),
        };
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "card_action");
        assert_eq!(value["payload"]["action"]["type"], "shuffle");
        assert_eq!(
            value["payload"]["state"]["deckCards"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        assert_eq!(value["payload"]["state"]["shuffleSeed"], 5);

        // 能原样解析回来
        let parsed: ChannelMessage = serde_json::from_value(value).unwrap();
        let ChannelMessage::CardAction { state: parsed_state, .. } = parsed;
        assert_eq!(parsed_state, state);
    }

    #[test]
    fn test_room_record_wire_shape() {
        let player = Uuid::new_v4();
        let state = actions::initialize_deck(vec!["c1".into()], player, 1);
        let record = RoomRecord::new(state);

        let value = serde_json::to_value(&record).unwrap();
        // 消费方约定的嵌套字段名：game_data.cardState
        assert!(value["game_data"]["cardState"].is_object());
        assert!(value["updated_at"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_action_record_optional_fields_omitted() {
        let player = Uuid::new_v4();
        let state = actions::initialize_deck(vec!["c1".into()], player, 1);
        let mut action = state.last_action.unwrap();
        action.from = None;
        action.to = None;

        let value = serde_json::to_value(&action).unwrap();
        assert!(value.get("from").is_none());
        assert!(value.get("to").is_none());
        assert_eq!(value["type"], "shuffle");
    }
}
