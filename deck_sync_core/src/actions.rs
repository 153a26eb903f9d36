//! 同步牌局状态上的动作应用
//!
//! 每个函数遵循同一个模式：先验证前置条件，不满足就原样返回
//! （返回 None/false，不产生任何变更）；满足则把当前状态变换成下一个完整状态，
//! 并在 `last_action` 里记下动作描述，交给复制层广播+持久化。

use crate::deck::{now_millis, CardRef};
use crate::shuffle::{random_seed, shuffle_with_seed};
use crate::state::{
    ActionKind, ActionRecord, CardLocation, PlayerId, SyncedCard, SyncedGameState,
};
use std::collections::HashMap;
use uuid::Uuid;

/// 初始化整副同步牌组
///
/// 为每张输入卡牌建立 `location: Deck` 的 `SyncedCard`，
/// 用 `shuffle_with_seed` 洗牌（相同种子的对等端得到相同顺序），
/// 按最终顺序重排 `position`，其余容器清空，盖上 `shuffle_seed`，
/// 记录一条 `Shuffle` 动作。
pub fn initialize_deck(cards: Vec<CardRef>, player_id: PlayerId, seed: u64) -> SyncedGameState {
    let mut deck_cards: Vec<SyncedCard> = cards
        .into_iter()
        .map(|card_id| SyncedCard {
            id: Uuid::new_v4(),
            card_id,
            owner_id: None,
            location: CardLocation::Deck,
            position: 0,
            is_flipped: false,
            metadata: serde_json::Value::Null,
        })
        .collect();
    shuffle_with_seed(&mut deck_cards, seed);
    reindex(&mut deck_cards);

    SyncedGameState {
        deck_cards,
        discard_pile: Vec::new(),
        table_cards: Vec::new(),
        player_hands: HashMap::new(),
        current_drawer: None,
        last_action: Some(record(ActionKind::Shuffle, player_id, vec![], None, None)),
        shuffle_seed: seed,
    }
}

/// 摸 `count` 张牌到调用者手里
///
/// 牌堆不足 `count` 张时失败：返回 None，状态不变，不广播。
/// 成功时从 `deck_cards` 头部取走 `count` 张，
/// 设为 `location: Hand`、`owner_id: 调用者`、`is_flipped: true`，
/// 追加到调用者的手牌序列，记录一条 `Draw` 动作，返回摸到的牌。
pub fn draw_cards(
    state: &mut SyncedGameState,
    player_id: PlayerId,
    count: usize,
) -> Option<Vec<SyncedCard>> {
    if state.deck_cards.len() < count {
        return None;
    }

    let mut drawn: Vec<SyncedCard> = state.deck_cards.drain(0..count).collect();
    let hand = state.player_hands.entry(player_id).or_default();
    for card in drawn.iter_mut() {
        card.location = CardLocation::Hand;
        card.owner_id = Some(player_id);
        card.is_flipped = true;
        card.position = hand.len() as u32;
        hand.push(card.clone());
    }

    state.current_drawer = Some(player_id);
    state.last_action = Some(record(
        ActionKind::Draw,
        player_id,
        drawn.iter().map(|c| c.id).collect(),
        Some(CardLocation::Deck),
        Some(CardLocation::Hand),
    ));
    Some(drawn)
}

/// 从调用者手里弃一张牌
///
/// 牌不在调用者手里时失败：返回 false，不广播。
/// 成功时把牌搬到弃牌堆最前面，清空归属，`is_flipped: true`，
/// 记录一条 `Discard` 动作。
pub fn discard_card(state: &mut SyncedGameState, player_id: PlayerId, card_id: Uuid) -> bool {
    let Some(hand) = state.player_hands.get_mut(&player_id) else {
        return false;
    };
    let Some(idx) = hand.iter().position(|c| c.id == card_id) else {
        return false;
    };

    let mut card = hand.remove(idx);
    card.location = CardLocation::Discard;
    card.owner_id = None;
    card.is_flipped = true;
    state.discard_pile.insert(0, card);

    state.last_action = Some(record(
        ActionKind::Discard,
        player_id,
        vec![card_id],
        Some(CardLocation::Hand),
        Some(CardLocation::Discard),
    ));
    true
}

/// 把调用者手里的一张牌打到桌面
///
/// 牌不在调用者手里时失败：返回 false。
/// 成功时把牌搬到 `table_cards` 末尾——归属刻意不清空，
/// 打出的牌仍归打出它的玩家（与弃牌不同），记录一条 `Play` 动作。
pub fn play_card(state: &mut SyncedGameState, player_id: PlayerId, card_id: Uuid) -> bool {
    let Some(hand) = state.player_hands.get_mut(&player_id) else {
        return false;
    };
    let Some(idx) = hand.iter().position(|c| c.id == card_id) else {
        return false;
    };

    let mut card = hand.remove(idx);
    card.location = CardLocation::Table;
    card.position = state.table_cards.len() as u32;
    state.table_cards.push(card);

    state.last_action = Some(record(
        ActionKind::Play,
        player_id,
        vec![card_id],
        Some(CardLocation::Hand),
        Some(CardLocation::Table),
    ));
    true
}

/// 把整个弃牌堆搬回牌堆
///
/// 弃牌堆为空时无事发生。
/// 注意：这里只按弃牌堆现有顺序搬移并刷新种子，并不重排这些牌的顺序——
/// 这是本系统两个牌堆抽象之间刻意保留的不对称
/// （牌堆引擎的耗尽重洗会真正洗牌）。
pub fn reshuffle_discard(state: &mut SyncedGameState, player_id: PlayerId) {
    if state.discard_pile.is_empty() {
        return;
    }

    let moved = std::mem::take(&mut state.discard_pile);
    for mut card in moved {
        card.location = CardLocation::Deck;
        card.owner_id = None;
        card.is_flipped = false;
        state.deck_cards.push(card);
    }
    reindex(&mut state.deck_cards);
    state.shuffle_seed = random_seed();

    state.last_action = Some(record(
        ActionKind::Shuffle,
        player_id,
        vec![],
        Some(CardLocation::Discard),
        Some(CardLocation::Deck),
    ));
}

// --- 辅助函数 ---

/// 按当前顺序重排容器内的 position
fn reindex(cards: &mut [SyncedCard]) {
    for (i, card) in cards.iter_mut().enumerate() {
        card.position = i as u32;
    }
}

fn record(
    kind: ActionKind,
    player_id: PlayerId,
    card_ids: Vec<Uuid>,
    from: Option<CardLocation>,
    to: Option<CardLocation>,
) -> ActionRecord {
    ActionRecord {
        kind,
        player_id,
        card_ids,
        from,
        to,
        timestamp: now_millis(),
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[&str]) -> Vec<CardRef> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    // 辅助函数：初始化一副 n 张的牌局
    fn setup(n: usize, seed: u64) -> (SyncedGameState, PlayerId) {
        let cards: Vec<CardRef> = (0..n).map(|i| format!("c{}", i + 1)).collect();
        let player_id = Uuid::new_v4();
        (initialize_deck(cards, player_id, seed), player_id)
    }

    // 辅助函数：全部容器里的物理卡牌标识（排序后比较，验证守恒）
    fn multiset(state: &SyncedGameState) -> Vec<CardRef> {
        let mut all: Vec<CardRef> = state.all_cards().map(|c| c.card_id.clone()).collect();
        all.sort();
        all
    }

    #[test]
    fn test_initialize_deck_builds_shuffled_deck() {
        let (state, _) = setup(5, 42);

        assert_eq!(state.deck_cards.len(), 5);
        assert!(state.discard_pile.is_empty());
        assert!(state.table_cards.is_empty());
        assert!(state.player_hands.is_empty());
        assert_eq!(state.shuffle_seed, 42);
        assert!(state.is_consistent());

        // 所有牌都在牌堆里，position 与最终顺序一致
        for (i, card) in state.deck_cards.iter().enumerate() {
            assert_eq!(card.location, CardLocation::Deck);
            assert_eq!(card.owner_id, None);
            assert!(!card.is_flipped);
            assert_eq!(card.position, i as u32);
        }

        let action = state.last_action.as_ref().unwrap();
        assert_eq!(action.kind, ActionKind::Shuffle);
    }

    #[test]
    fn test_initialize_is_deterministic_for_same_seed() {
        // 实例ID每次都是新的，但物理卡牌的顺序必须只由种子决定
        let (a, _) = setup(10, 7);
        let (b, _) = setup(10, 7);
        let order_a: Vec<&CardRef> = a.deck_cards.iter().map(|c| &c.card_id).collect();
        let order_b: Vec<&CardRef> = b.deck_cards.iter().map(|c| &c.card_id).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_draw_fails_when_not_enough_cards() {
        let (mut state, player) = setup(3, 1);
        let before = state.clone();

        assert!(draw_cards(&mut state, player, 4).is_none());
        // 失败时状态必须逐字节不变
        assert_eq!(state, before);
    }

    #[test]
    fn test_end_to_end_draw_then_discard() {
        // 完整走一遍：初始化 c1..c3 → p1 摸一张 → p1 弃掉同一张
        let (mut state, p1) = setup(3, 42);

        let drawn = draw_cards(&mut state, p1, 1).expect("deck has 3 cards");
        assert_eq!(drawn.len(), 1);
        let card = &drawn[0];

        assert_eq!(state.deck_cards.len(), 2);
        assert_eq!(state.player_hands[&p1].len(), 1);
        assert_eq!(card.location, CardLocation::Hand);
        assert_eq!(card.owner_id, Some(p1));
        assert!(card.is_flipped);
        assert_eq!(state.current_drawer, Some(p1));

        let action = state.last_action.clone().unwrap();
        assert_eq!(action.kind, ActionKind::Draw);
        assert_eq!(action.player_id, p1);
        assert_eq!(action.card_ids, vec![card.id]);
        assert_eq!(action.from, Some(CardLocation::Deck));
        assert_eq!(action.to, Some(CardLocation::Hand));

        assert!(discard_card(&mut state, p1, card.id));
        assert!(state.player_hands[&p1].is_empty());
        assert_eq!(state.discard_pile[0].id, card.id);
        assert_eq!(state.discard_pile[0].owner_id, None);
        assert!(state.discard_pile[0].is_flipped);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_discard_unknown_card_is_rejected() {
        let (mut state, player) = setup(3, 1);
        draw_cards(&mut state, player, 1).unwrap();
        let before = state.clone();

        assert!(!discard_card(&mut state, player, Uuid::new_v4()));
        assert_eq!(state.player_hands, before.player_hands);
        assert_eq!(state.discard_pile, before.discard_pile);
        assert_eq!(state, before);
    }

    #[test]
    fn test_discard_from_other_players_hand_is_rejected() {
        let (mut state, p1) = setup(3, 1);
        let drawn = draw_cards(&mut state, p1, 1).unwrap();

        // p2 不能弃掉 p1 手里的牌
        let p2 = Uuid::new_v4();
        assert!(!discard_card(&mut state, p2, drawn[0].id));
        assert_eq!(state.player_hands[&p1].len(), 1);
    }

    #[test]
    fn test_discard_goes_to_front_of_pile() {
        let (mut state, player) = setup(3, 1);
        let drawn = draw_cards(&mut state, player, 2).unwrap();

        assert!(discard_card(&mut state, player, drawn[0].id));
        assert!(discard_card(&mut state, player, drawn[1].id));
        // 后弃的牌在弃牌堆最前面
        assert_eq!(state.discard_pile[0].id, drawn[1].id);
        assert_eq!(state.discard_pile[1].id, drawn[0].id);
    }

    #[test]
    fn test_play_card_keeps_ownership() {
        let (mut state, player) = setup(3, 1);
        let drawn = draw_cards(&mut state, player, 1).unwrap();

        assert!(play_card(&mut state, player, drawn[0].id));
        assert!(state.player_hands[&player].is_empty());

        let played = state.table_cards.last().unwrap();
        assert_eq!(played.id, drawn[0].id);
        assert_eq!(played.location, CardLocation::Table);
        // 与弃牌不同：打出的牌保留打出者的归属
        assert_eq!(played.owner_id, Some(player));
        assert!(state.is_consistent());

        assert_eq!(state.last_action.as_ref().unwrap().kind, ActionKind::Play);
    }

    #[test]
    fn test_play_unknown_card_is_rejected() {
        let (mut state, player) = setup(3, 1);
        let before = state.clone();
        assert!(!play_card(&mut state, player, Uuid::new_v4()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_reshuffle_preserves_discard_order() {
        let (mut state, player) = setup(4, 9);
        let drawn = draw_cards(&mut state, player, 3).unwrap();
        for card in &drawn {
            assert!(discard_card(&mut state, player, card.id));
        }
        // 弃牌按前插顺序排列：最后弃的在最前
        let discard_order: Vec<Uuid> = state.discard_pile.iter().map(|c| c.id).collect();
        let deck_len_before = state.deck_cards.len();

        reshuffle_discard(&mut state, player);

        assert!(state.discard_pile.is_empty());
        assert_eq!(state.deck_cards.len(), deck_len_before + 3);
        // 搬回的牌保持弃牌堆顺序，不重排
        let moved: Vec<Uuid> = state.deck_cards[deck_len_before..]
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(moved, discard_order);

        for card in &state.deck_cards {
            assert_eq!(card.location, CardLocation::Deck);
            assert_eq!(card.owner_id, None);
            assert!(!card.is_flipped);
        }
        assert!(state.is_consistent());
        assert_eq!(state.last_action.as_ref().unwrap().kind, ActionKind::Shuffle);
    }

    #[test]
    fn test_reshuffle_with_empty_discard_is_noop() {
        let (mut state, player) = setup(3, 1);
        let before = state.clone();
        reshuffle_discard(&mut state, player);
        assert_eq!(state, before);
    }

    #[test]
    fn test_conservation_over_mixed_sequence() {
        let (mut state, p1) = setup(6, 3);
        let p2 = Uuid::new_v4();
        let mut expected: Vec<CardRef> = (0..6).map(|i| format!("c{}", i + 1)).collect();
        expected.sort();

        let d1 = draw_cards(&mut state, p1, 2).unwrap();
        let d2 = draw_cards(&mut state, p2, 1).unwrap();
        assert!(play_card(&mut state, p1, d1[0].id));
        assert!(discard_card(&mut state, p2, d2[0].id));
        reshuffle_discard(&mut state, p1);

        assert_eq!(multiset(&state), expected);
        assert_eq!(state.card_count(), 6);
        assert!(state.is_consistent());
    }
}
