//! destek 共享类型
//!
//! 领域模型（Thread / Message / Summary）与实时通道的事件协议。
//! hub 与客户端同步层共用，保证两侧对消息身份与顺序的理解一致。

pub mod event;
pub mod model;

pub use event::{ClientEvent, ServerEvent};
pub use model::{preview_of, Message, MessageKind, Sender, Thread, ThreadSummary, PREVIEW_LEN};
