//! # 复制层 (Replication Layer)
//!
//! 管理一个房间的频道订阅生命周期：把本地状态变更翻译成出站广播，
//! 把入站广播翻译成整份本地状态替换，并用持久化的房间记录
//! 作为迟到者/重连者的兜底读取路径。
//!
//! 调用方通过 [`SyncSession`] 使用这一层：进入房间时构造，
//! 离开房间时调用 [`SyncSession::leave`] 释放订阅。
//! 传输由 [`BroadcastChannel`] 与 [`RoomStore`] 两个接口抽象，
//! 对应系统的两个外部协作者；[`ws`] 提供经中继服务器的 WebSocket 实现，
//! [`memory`] 提供进程内实现（测试与单进程演示用）。

pub mod memory;
mod session;
mod transport;
pub mod ws;

pub use session::*;

pub use transport::*;
