//! 领域模型
//!
//! Thread / Message 等共享类型定义在 destek-types，
//! 这里只放 hub 自有的通道会话状态机。

mod session;

pub use destek_types::{Message, MessageKind, Sender, Thread, ThreadSummary, preview_of};
pub use session::{ChannelSession, SessionRole, SessionState};
