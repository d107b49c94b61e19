//! 管理端会话列表视图
//!
//! 推拉结合：推送事件只把列表标脏，真正的行内容以重拉
//! list_threads 的结果整体替换。避免对摘要做增量补丁的竞态。

use destek_types::{ServerEvent, ThreadSummary};

/// 管理端的会话列表
#[derive(Debug, Default)]
pub struct ThreadListView {
    threads: Vec<ThreadSummary>,
    dirty: bool,
}

impl ThreadListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// 消化一条推送事件，返回是否需要重拉列表
    ///
    /// 在线状态边沿可以就地修补（纯派生数据），其余摘要变更一律标脏。
    pub fn note_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewMessageNotification { .. }
            | ServerEvent::MessageFromVisitor { .. }
            | ServerEvent::ThreadCleared { .. }
            | ServerEvent::ThreadsCleared => {
                self.dirty = true;
            }
            ServerEvent::VisitorOnline { thread_id } => {
                if !self.set_online(thread_id, true) {
                    // 未知会话上线，说明列表缺行
                    self.dirty = true;
                }
            }
            ServerEvent::VisitorOffline { thread_id } => {
                self.set_online(thread_id, false);
            }
            _ => {}
        }
        self.dirty
    }

    /// 重拉完成，整体替换
    pub fn replace(&mut self, threads: Vec<ThreadSummary>) {
        self.threads = threads;
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn threads(&self) -> &[ThreadSummary] {
        &self.threads
    }

    pub fn get(&self, thread_id: &str) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| t.id == thread_id)
    }

    fn set_online(&mut self, thread_id: &str, online: bool) -> bool {
        match self.threads.iter_mut().find(|t| t.id == thread_id) {
            Some(thread) => {
                thread.online = online;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(id: &str, online: bool) -> ThreadSummary {
        ThreadSummary {
            id: id.to_string(),
            display_name: format!("visitor-{}", id),
            last_activity_at: Utc::now(),
            online,
            preview: None,
        }
    }

    #[test]
    fn test_notification_marks_dirty() {
        let mut list = ThreadListView::new();
        list.replace(vec![summary("t1", false)]);

        let needs_refetch = list.note_event(&ServerEvent::NewMessageNotification {
            thread_id: "t1".to_string(),
            display_name: "Ayşe".to_string(),
            preview: "Merhaba".to_string(),
        });
        assert!(needs_refetch);

        list.replace(vec![summary("t1", true)]);
        assert!(!list.is_dirty());
    }

    #[test]
    fn test_presence_edges_patch_in_place() {
        let mut list = ThreadListView::new();
        list.replace(vec![summary("t1", false)]);

        list.note_event(&ServerEvent::VisitorOnline {
            thread_id: "t1".to_string(),
        });
        assert!(!list.is_dirty());
        assert!(list.get("t1").unwrap().online);

        list.note_event(&ServerEvent::VisitorOffline {
            thread_id: "t1".to_string(),
        });
        assert!(!list.get("t1").unwrap().online);
    }

    #[test]
    fn test_unknown_thread_online_forces_refetch() {
        let mut list = ThreadListView::new();
        list.replace(vec![summary("t1", false)]);

        let needs_refetch = list.note_event(&ServerEvent::VisitorOnline {
            thread_id: "t9".to_string(),
        });
        assert!(needs_refetch);
    }

    #[test]
    fn test_clear_all_marks_dirty() {
        let mut list = ThreadListView::new();
        list.replace(vec![summary("t1", true), summary("t2", false)]);

        assert!(list.note_event(&ServerEvent::ThreadsCleared));
        list.replace(Vec::new());
        assert!(list.threads().is_empty());
    }
}
