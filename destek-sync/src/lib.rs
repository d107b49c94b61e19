//! destek 客户端同步层
//!
//! 实时推送和历史拉取是两条独立的投递路径，同一条消息可能各到一次。
//! 服务端不做恰好一次投递，正确性来自这里的幂等合并：
//! 每条消息按 id 在视图里最多渲染一次，顺序以服务端时间戳为准。

pub mod message_view;
pub mod pending;
pub mod thread_list;

pub use message_view::MessageView;
pub use pending::{ClientView, PendingMessage, RenderEntry};
pub use thread_list::ThreadListView;
