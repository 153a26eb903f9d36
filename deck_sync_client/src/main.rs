use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use deck_sync_client::{ws, BroadcastChannel, RoomStore, SyncSession};
use deck_sync_core::{ActionRecord, CardRef, RoomId};

enum Input {
    Line(Option<String>),
    Remote(Option<ActionRecord>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // 不带参数时开一个新房间；带房间ID时加入已有房间
    let room_id: RoomId = match std::env::args().nth(1) {
        Some(arg) => arg.parse().expect("无效的房间ID格式"),
        None => Uuid::new_v4(),
    };
    let player_id = Uuid::new_v4();

    let (channel, store) = ws::connect("ws://127.0.0.1:25917/ws", room_id).await?;
    let mut session = SyncSession::join(room_id, player_id, channel, store).await?;

    println!("已进入房间 {} (玩家 {})", room_id, player_id);
    if session.is_initialized() {
        println!("已从房间记录追上当前牌局");
    }

    println!("--- 共享牌组客户端 ---");
    println!("可用命令:");
    println!("  init [牌面id...]      - 初始化牌局 (缺省生成 card-1..card-52)");
    println!("  draw [张数]           - 摸牌 (缺省1张)");
    println!("  discard <手牌序号>    - 弃掉手里的第几张牌 (从0开始)");
    println!("  play <手牌序号>       - 把手里的第几张牌打到桌面");
    println!("  reshuffle             - 把弃牌堆搬回牌堆");
    println!("  state                 - 查看当前牌局");
    println!("  exit                  - 离开房间");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let input = tokio::select! {
            line = stdin.next_line() => Input::Line(line?),
            action = session.sync_next() => Input::Remote(action),
        };

        let line = match input {
            Input::Remote(Some(action)) => {
                println!("\n<-- [远端动作]: {:?}", action);
                continue;
            }
            Input::Remote(None) => {
                eprintln!("与服务器的连接已断开");
                break;
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => line,
        };

        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        match parts.first().cloned() {
            Some("init") => {
                let cards: Vec<CardRef> = if parts.len() > 1 {
                    parts[1..].iter().map(|s| s.to_string()).collect()
                } else {
                    (1..=52).map(|i| format!("card-{}", i)).collect()
                };
                let seed = session.initialize_deck(cards, None).await;
                println!("牌局已初始化，种子 {}", seed);
            }
            Some("draw") => {
                let count: usize = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                match session.draw_card(count).await {
                    Some(cards) => {
                        for card in cards {
                            println!("摸到 {}", card.card_id);
                        }
                    }
                    None => println!("摸牌失败：牌堆不足或牌局未初始化"),
                }
            }
            Some(cmd @ ("discard" | "play")) => {
                let Some(idx) = parts.get(1).and_then(|s| s.parse::<usize>().ok()) else {
                    println!("用法: {} <手牌序号>", cmd);
                    continue;
                };
                let card_id = session
                    .state()
                    .and_then(|s| s.player_hands.get(&player_id))
                    .and_then(|hand| hand.get(idx))
                    .map(|c| c.id);
                let Some(card_id) = card_id else {
                    println!("手里没有第 {} 张牌", idx);
                    continue;
                };
                let ok = if cmd == "discard" {
                    session.discard_card(card_id).await
                } else {
                    session.play_card(card_id).await
                };
                if !ok {
                    println!("操作失败");
                }
            }
            Some("reshuffle") => {
                session.reshuffle_discard().await;
            }
            Some("state") => print_state(&session),
            Some("exit") => {
                println!("正在离开房间...");
                break;
            }
            _ => println!("未知命令: {}", line),
        }
    }

    session.leave().await;
    Ok(())
}

fn print_state<C: BroadcastChannel, S: RoomStore>(session: &SyncSession<C, S>) {
    let Some(state) = session.state() else {
        println!("牌局尚未初始化");
        return;
    };
    println!(
        "牌堆 {} 张 | 弃牌堆 {} 张 | 桌面 {} 张 | 种子 {}",
        state.deck_cards.len(),
        state.discard_pile.len(),
        state.table_cards.len(),
        state.shuffle_seed
    );
    for (player, hand) in &state.player_hands {
        let cards: Vec<&str> = hand.iter().map(|c| c.card_id.as_str()).collect();
        let marker = if *player == session.player_id() {
            " (我)"
        } else {
            ""
        };
        println!("玩家 {}{}: {:?}", player, marker, cards);
    }
    if let Some(action) = &state.last_action {
        println!("上一个动作: {:?}", action);
    }
}
