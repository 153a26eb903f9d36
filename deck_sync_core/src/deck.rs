use crate::shuffle::fisher_yates;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// --- 牌堆引擎 (Deck Engine) ---

/// 一张物理卡牌的不透明标识符，只会在容器之间搬移，从不被修改。
pub type CardRef = String;

/// 牌堆引擎的状态：摸牌堆 + 弃牌堆
///
/// 不变量：`draw_pile ∪ discard_pile` 始终是初始 `total_cards` 张牌的一个排列，
/// 任何操作都不会复制或丢失卡牌。
/// 所有操作都返回全新的状态，从不原地部分更新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckState {
    pub draw_pile: Vec<CardRef>,
    pub discard_pile: Vec<CardRef>,
    pub total_cards: usize,
    /// 上次洗牌的时间戳（epoch 毫秒）
    pub last_shuffled: u64,
    pub reshuffle_count: u32,
}

/// `draw_from_deck` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    /// 摸到的牌；两堆都为空时为 None（牌已耗尽，不是错误）
    pub card_id: Option<CardRef>,
    pub deck_state: DeckState,
    /// 本次摸牌是否触发了弃牌堆重洗
    pub reshuffled: bool,
}

/// 用全部卡牌标识初始化牌堆
///
/// 真随机 Fisher–Yates 洗入摸牌堆；弃牌堆为空。
/// 这条路径用于首次真正的随机化，不要求可确定性重放。
pub fn initialize_deck(card_ids: Vec<CardRef>) -> DeckState {
    let total_cards = card_ids.len();
    let mut draw_pile = card_ids;
    let mut rng = rand::rng();
    fisher_yates(&mut draw_pile, &mut rng);
    DeckState {
        draw_pile,
        discard_pile: Vec::new(),
        total_cards,
        last_shuffled: now_millis(),
        reshuffle_count: 0,
    }
}

/// 从牌堆摸一张牌
///
/// - 摸牌堆非空：取出堆顶，追加到弃牌堆，随牌返回。
/// - 摸牌堆为空、弃牌堆非空：先把弃牌堆重洗成新的摸牌堆
///   （`reshuffle_count` 加一并盖上 `last_shuffled` 时间戳），再摸。
/// - 两堆都为空：返回 `card_id: None` 和原状态，表示牌已耗尽。
pub fn draw_from_deck(state: &DeckState) -> DrawOutcome {
    let mut next = state.clone();
    let mut reshuffled = false;

    if next.draw_pile.is_empty() {
        if next.discard_pile.is_empty() {
            return DrawOutcome {
                card_id: None,
                deck_state: next,
                reshuffled: false,
            };
        }
        // 摸牌堆耗尽：弃牌堆洗回成新的摸牌堆
        next.draw_pile = std::mem::take(&mut next.discard_pile);
        let mut rng = rand::rng();
        fisher_yates(&mut next.draw_pile, &mut rng);
        next.reshuffle_count += 1;
        next.last_shuffled = now_millis();
        reshuffled = true;
    }

    let card = next.draw_pile.remove(0);
    next.discard_pile.push(card.clone());

    DrawOutcome {
        card_id: Some(card),
        deck_state: next,
        reshuffled,
    }
}

// --- 查询辅助：纯投影，无副作用 ---

impl DeckState {
    pub fn is_deck_empty(&self) -> bool {
        self.draw_pile.is_empty()
    }

    pub fn cards_remaining(&self) -> usize {
        self.draw_pile.len()
    }

    pub fn cards_discarded(&self) -> usize {
        self.discard_pile.len()
    }
}

/// 当前 epoch 毫秒时间戳
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// --- 单元测试 ---
