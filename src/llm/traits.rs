//! 模型后端抽象
//!
//! 后端实现 ModelBackend：给定完整消息序列与当前全部工具签名，
//! 返回一条 Assistant 消息（纯文本或携带 tool_calls）。

use async_trait::async_trait;

use crate::core::AgentError;
use crate::memory::Message;
use crate::tools::ToolDescriptor;

/// 模型后端 trait：每次调用都整体声明工具签名集，不做增量
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// 非流式完成；传输 / 鉴权 / 响应格式问题返回 AgentError::Backend
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, AgentError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
