//! # 共享牌组同步核心库
//!
//! 这个 `core` crate 包含了多人卡牌游戏共享状态同步所需的全部核心逻辑：
//! 牌堆引擎（摸牌堆/弃牌堆模型）、确定性的带种子洗牌、
//! 跨玩家复制的完整牌局状态及其动作应用，
//! 以及频道广播与房间记录的消息定义。
//! 它的设计目标是与具体实现（如网络传输、客户端UI）解耦，
//! 使其可以被任何上层应用复用。

pub mod actions;
mod deck;
mod message;
mod shuffle;
mod state;

pub use deck::*;

pub use message::*;

pub use shuffle::*;

pub use state::*;
