//! 在线状态跟踪器
//!
//! 把活跃信号（消息、心跳、join）折算成每线程的在线/离线视图。
//! 在线是派生视图而非事实：最后一次信号起 120 秒窗口内算在线。
//!
//! 定时器纪律：每次 mark_active 先中止上一个到期任务再挂新的，
//! 每个线程至多一个挂起的定时器，不会堆积。中止只在 await 点生效，
//! 代数校验兜住已越过 sleep 的任务：代数不符直接退出，
//! 不会有过期的定时器在新信号之后误报离线。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

struct PresenceEntry {
    generation: u64,
    last_seen: Instant,
    /// 当前挂起的到期任务，刷新时中止
    timer: Option<AbortHandle>,
}

/// 每线程在线状态跟踪
pub struct PresenceTracker {
    window: Duration,
    entries: Mutex<HashMap<String, PresenceEntry>>,
    expiry_tx: mpsc::UnboundedSender<String>,
}

impl PresenceTracker {
    /// 返回跟踪器和到期事件接收端（由同步服务消费）
    pub fn new(window: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                window,
                entries: Mutex::new(HashMap::new()),
                expiry_tx,
            }),
            expiry_rx,
        )
    }

    /// 刷新活跃时刻，重置 120 秒倒计时。幂等。
    ///
    /// 返回是否发生离线→在线的边沿（供同步服务发 visitor_online）。
    /// 状态修改是同步的；只有到期等待挂在后台任务上。
    pub fn mark_active(self: &Arc<Self>, thread_id: &str) -> bool {
        let now = Instant::now();
        let (was_offline, generation) = {
            let mut entries = self.entries.lock().expect("presence lock poisoned");
            let entry = entries
                .entry(thread_id.to_string())
                .or_insert(PresenceEntry {
                    generation: 0,
                    last_seen: now,
                    timer: None,
                });
            let was_offline =
                entry.generation == 0 || now.duration_since(entry.last_seen) >= self.window;
            entry.generation += 1;
            entry.last_seen = now;
            // 重置即取消：旧定时器中止，不留闲置任务
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
            (was_offline, entry.generation)
        };

        let tracker = Arc::clone(self);
        let task_thread_id = thread_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(tracker.window).await;
            tracker.expire_if_stale(&task_thread_id, generation);
        });

        let mut entries = self.entries.lock().expect("presence lock poisoned");
        if let Some(entry) = entries.get_mut(thread_id) {
            // 两次加锁之间可能又有刷新；只给自己这一代挂定时器句柄
            if entry.generation == generation {
                entry.timer = Some(handle.abort_handle());
            }
        }

        was_offline
    }

    pub fn is_online(&self, thread_id: &str) -> bool {
        let entries = self.entries.lock().expect("presence lock poisoned");
        match entries.get(thread_id) {
            Some(entry) => Instant::now().duration_since(entry.last_seen) < self.window,
            None => false,
        }
    }

    /// 线程被删除时撤掉跟踪记录（不发离线事件）
    pub fn remove(&self, thread_id: &str) {
        let mut entries = self.entries.lock().expect("presence lock poisoned");
        if let Some(entry) = entries.remove(thread_id) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().expect("presence lock poisoned");
        for entry in entries.values() {
            if let Some(timer) = &entry.timer {
                timer.abort();
            }
        }
        entries.clear();
    }

    fn expire_if_stale(&self, thread_id: &str, generation: u64) {
        let expired = {
            let mut entries = self.entries.lock().expect("presence lock poisoned");
            match entries.get(thread_id) {
                // 代数一致且窗口确已耗尽才算到期；
                // 期间有新的 mark_active 则这个定时器作废
                Some(entry)
                    if entry.generation == generation
                        && Instant::now().duration_since(entry.last_seen) >= self.window =>
                {
                    entries.remove(thread_id);
                    true
                }
                _ => false,
            }
        };

        if expired {
            debug!(thread_id = %thread_id, "presence window expired");
            // 接收端关闭说明服务在停机，丢弃即可
            let _ = self.expiry_tx.send(thread_id.to_string());
        }
    }
}
