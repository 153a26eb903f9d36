use crate::transport::{BroadcastChannel, RoomStore, TransportError};
use deck_sync_core::{
    actions, random_seed, ActionRecord, CardRef, ChannelMessage, PlayerId, RoomId, RoomRecord,
    SyncedCard, SyncedGameState,
};
use tracing::warn;
use uuid::Uuid;

/// 入站快照的对账策略
///
/// 默认是"最后广播获胜"：整份替换、不合并、不检测冲突。
/// 如果将来需要更强的保证（比如单写入者仲裁或基于版本号的拒绝），
/// 替换这里的实现即可，牌堆引擎和同步状态逻辑都不用动。
pub trait Reconcile: Send {
    fn reconcile(
        &self,
        local: Option<SyncedGameState>,
        incoming: SyncedGameState,
    ) -> SyncedGameState;
}

/// 最后广播获胜：无条件采用入站快照
pub struct LastBroadcastWins;

impl Reconcile for LastBroadcastWins {
    fn reconcile(
        &self,
        _local: Option<SyncedGameState>,
        incoming: SyncedGameState,
    ) -> SyncedGameState {
        incoming
    }
}

/// 一个房间的同步会话，由调用方持有
///
/// 进入房间时构造（[`SyncSession::join`]），离开时调用 [`SyncSession::leave`]。
/// 每个本地动作遵循同一个模式：从当前状态算出下一个完整状态，
/// 成功则交给复制层广播+持久化，失败返回 None/false 且绝不广播
/// （不会有半成品状态泄漏给对等端）。
///
/// 状态机：`state` 为 None 即 UNINITIALIZED，
/// 首次成功的 `initialize_deck`（本地或远端）之后进入 INITIALIZED；
/// 未初始化时除初始化外的所有动作都被拒绝。
pub struct SyncSession<C: BroadcastChannel, S: RoomStore> {
    room_id: RoomId,
    player_id: PlayerId,
    channel: C,
    store: S,
    reconciler: Box<dyn Reconcile>,
    state: Option<SyncedGameState>,
    is_syncing: bool,
}

impl<C: BroadcastChannel, S: RoomStore> SyncSession<C, S> {
    /// 进入房间：频道已由传输层订阅好，这里读取持久化的房间记录，
    /// 若其中已有牌局快照则直接采用——迟到者和重连者由此追上进度，
    /// 不需要重放任何动作。
    pub async fn join(
        room_id: RoomId,
        player_id: PlayerId,
        channel: C,
        mut store: S,
    ) -> Result<Self, TransportError> {
        let state = match store.fetch().await?.and_then(|r| r.game_data.card_state) {
            Some(snapshot) if snapshot.is_consistent() => Some(snapshot),
            Some(_) => {
                warn!("房间记录里的快照不一致，忽略，按未初始化进入");
                None
            }
            None => None,
        };

        Ok(SyncSession {
            room_id,
            player_id,
            channel,
            store,
            reconciler: Box::new(LastBroadcastWins),
            state,
            is_syncing: false,
        })
    }

    /// 替换对账策略
    pub fn with_reconciler(mut self, reconciler: Box<dyn Reconcile>) -> Self {
        self.reconciler = reconciler;
        self
    }

    // --- 状态读取（UI 层可用的唯一只读口） ---

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn state(&self) -> Option<&SyncedGameState> {
        self.state.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// 是否正处在广播+持久化的交接过程中
    pub fn is_syncing(&self) -> bool {
        self.is_syncing
    }

    // --- 本地动作 ---

    /// 初始化牌局：建牌、按种子洗牌、广播一条 `Shuffle` 动作。
    /// 不传种子时随机取一个。返回实际使用的种子。
    pub async fn initialize_deck(&mut self, cards: Vec<CardRef>, seed: Option<u64>) -> u64 {
        let seed = seed.unwrap_or_else(random_seed);
        let next = actions::initialize_deck(cards, self.player_id, seed);
        self.commit(next).await;
        seed
    }

    /// 摸 `count` 张牌。牌堆不足或未初始化时返回 None，无变更、不广播。
    pub async fn draw_card(&mut self, count: usize) -> Option<Vec<SyncedCard>> {
        let mut next = self.state.as_ref()?.clone();
        let drawn = actions::draw_cards(&mut next, self.player_id, count)?;
        self.commit(next).await;
        Some(drawn)
    }

    /// 弃掉自己手里的一张牌。牌不在手里或未初始化时返回 false。
    pub async fn discard_card(&mut self, card_id: Uuid) -> bool {
        let Some(state) = self.state.as_ref() else {
            return false;
        };
        let mut next = state.clone();
        if !actions::discard_card(&mut next, self.player_id, card_id) {
            return false;
        }
        self.commit(next).await;
        true
    }

    /// 把自己手里的一张牌打到桌面。牌不在手里或未初始化时返回 false。
    pub async fn play_card(&mut self, card_id: Uuid) -> bool {
        let Some(state) = self.state.as_ref() else {
            return false;
        };
        let mut next = state.clone();
        if !actions::play_card(&mut next, self.player_id, card_id) {
            return false;
        }
        self.commit(next).await;
        true
    }

    /// 把弃牌堆搬回牌堆。弃牌堆为空或未初始化时无事发生、不广播。
    pub async fn reshuffle_discard(&mut self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if state.discard_pile.is_empty() {
            return;
        }
        let mut next = state.clone();
        actions::reshuffle_discard(&mut next, self.player_id);
        self.commit(next).await;
    }

    /// 本地变更成功后的交接：先广播 `{ action, state }`，再尽力持久化记录。
    /// 两步相互独立、无原子性；任一失败只记日志，本地状态保持已生效，
    /// 不回滚（代价是本端可能暂时与其他对等端分叉）。
    async fn commit(&mut self, next: SyncedGameState) {
        self.is_syncing = true;
        let snapshot = next.clone();
        self.state = Some(next);

        if let Some(action) = snapshot.last_action.clone() {
            let message = ChannelMessage::CardAction {
                action,
                state: snapshot.clone(),
            };
            if let Err(e) = self.channel.publish(&message).await {
                warn!("广播动作失败: {}", e);
            }
            if let Err(e) = self.store.persist(&RoomRecord::new(snapshot)).await {
                warn!("持久化房间记录失败: {}", e);
            }
        }
        self.is_syncing = false;
    }

    // --- 入站广播 ---

    /// 等待下一条入站广播并应用到本地状态，
    /// 返回其中的动作记录（供 UI/动画使用）。
    ///
    /// 入站快照先做形状校验：不一致的快照被忽略、保留原状态，
    /// 继续等下一条。频道关闭时返回 None。
    pub async fn sync_next(&mut self) -> Option<ActionRecord> {
        loop {
            let ChannelMessage::CardAction { action, state } = self.channel.recv().await?;
            if !state.is_consistent() {
                warn!("收到不一致的快照，已忽略");
                continue;
            }
            self.state = Some(self.reconciler.reconcile(self.state.take(), state));
            return Some(action);
        }
    }

    /// 离开房间并退订频道。必须调用：
    /// 泄漏的订阅会在参与者离开后继续覆写本地状态。
    pub async fn leave(mut self) {
        if let Err(e) = self.channel.unsubscribe().await {
            warn!("退订频道失败: {}", e);
        }
    }
}

// --- 单元测试 ---
