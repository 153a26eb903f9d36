use crate::deck::CardRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// 卡牌当前所在的容器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardLocation {
    Deck,
    Hand,
    Discard,
    Table,
}

/// 同步状态中的一张卡牌
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedCard {
    /// 这张牌在本局中的唯一实例ID
    pub id: Uuid,
    /// 物理卡牌的不透明标识（从不修改）
    pub card_id: CardRef,
    /// 仅当 location == Hand 时必为 Some；打出到桌面的牌会保留归属
    pub owner_id: Option<PlayerId>,
    pub location: CardLocation,
    /// 在所属容器内的顺序位置
    pub position: u32,
    pub is_flipped: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Draw,
    Discard,
    Play,
    Shuffle,
}

/// 动作记录
///
/// 不可变，附在它所产生的状态上。只用于观察/动画触发，
/// 从不单独重放——权威的是状态本身，动作只是"相比上次广播变了什么"的描述。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub player_id: PlayerId,
    pub card_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<CardLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<CardLocation>,
    /// epoch 毫秒
    pub timestamp: u64,
}

/// 完整的跨玩家复制状态
///
/// 每次本地或远端动作都会整体替换这份文档，从不做局部补丁；
/// 收到它的每个参与者都把它当作新的唯一事实来源。
///
/// 不变量：每个 `SyncedCard.id` 在任一时刻恰好出现在
/// `deck_cards`、`discard_pile`、`table_cards` 或某个 `player_hands[*]` 之一中
/// （卡牌守恒——不复制、不丢失）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedGameState {
    pub deck_cards: Vec<SyncedCard>,
    pub discard_pile: Vec<SyncedCard>,
    pub table_cards: Vec<SyncedCard>,
    pub player_hands: HashMap<PlayerId, Vec<SyncedCard>>,
    pub current_drawer: Option<PlayerId>,
    pub last_action: Option<ActionRecord>,
    pub shuffle_seed: u64,
}

// --- SyncedGameState 的实现方法 ---

impl SyncedGameState {
    /// 遍历所有容器中的全部卡牌
    pub fn all_cards(&self) -> impl Iterator<Item = &SyncedCard> {
        self.deck_cards
            .iter()
            .chain(self.discard_pile.iter())
            .chain(self.table_cards.iter())
            .chain(self.player_hands.values().flatten())
    }

    pub fn card_count(&self) -> usize {
        self.all_cards().count()
    }

    /// 防御性形状校验：在用入站快照替换本地状态之前调用。
    ///
    /// 检查两条不变量：
    /// 1. 每个实例ID在所有容器中恰好出现一次（卡牌守恒）；
    /// 2. 归属规则——牌堆/弃牌堆中的牌无归属，手牌的归属必须等于所在玩家，
    ///    桌面牌保留打出者的归属（也允许为空）。
    /// 校验失败的快照应被忽略，保留原状态。
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        for card in self.all_cards() {
            if !seen.insert(card.id) {
                return false;
            }
        }

        let piled_ok = |cards: &[SyncedCard], location: CardLocation| {
            cards
                .iter()
                .all(|c| c.location == location && c.owner_id.is_none())
        };
        if !piled_ok(&self.deck_cards, CardLocation::Deck) {
            return false;
        }
        if !piled_ok(&self.discard_pile, CardLocation::Discard) {
            return false;
        }
        if !self
            .table_cards
            .iter()
            .all(|c| c.location == CardLocation::Table)
        {
            return false;
        }
        for (player_id, hand) in &self.player_hands {
            if !hand
                .iter()
                .all(|c| c.location == CardLocation::Hand && c.owner_id == Some(*player_id))
            {
                return false;
            }
        }
        true
    }
}
