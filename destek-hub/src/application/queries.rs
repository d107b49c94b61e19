/// 会话列表查询
#[derive(Debug, Clone)]
pub struct ListThreadsQuery;

/// 消息历史查询：limit 取尾窗，before_id 向更早翻页
#[derive(Debug, Clone)]
pub struct ListMessagesQuery {
    pub thread_id: String,
    pub limit: Option<usize>,
    pub before_id: Option<String>,
}
