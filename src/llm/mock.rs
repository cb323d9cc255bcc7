//! 脚本化 Mock 后端（用于测试，无需 API）
//!
//! 按顺序弹出预设的 Assistant 消息；脚本耗尽后回显最后一条 Human 消息，
//! 便于不依赖网络跑通整个回合状态机。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::AgentError;
use crate::llm::ModelBackend;
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// 脚本化后端：每次 complete 弹出一条预设回复
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Message>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    /// 构造携带单个工具调用的脚本消息，返回 (消息, call_id)
    pub fn tool_call_message(
        name: &str,
        arguments: serde_json::Value,
    ) -> (Message, String) {
        let call_id = format!("call-{}", uuid::Uuid::new_v4());
        let msg = Message::assistant_with_tools(
            None,
            vec![ToolCallRequest {
                call_id: call_id.clone(),
                name: name.to_string(),
                arguments,
            }],
        );
        (msg, call_id)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Message, AgentError> {
        if let Some(next) = self.responses.lock().await.pop_front() {
            return Ok(next);
        }

        let last_human = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Human)
            .map(|m| m.text())
            .unwrap_or_else(|| "(no input)".to_string());
        Ok(Message::assistant(format!("Echo: {}", last_human)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_scripted_responses_then_echoes() {
        let backend = ScriptedBackend::new(vec![Message::assistant("first")]);

        let m1 = backend
            .complete(&[Message::human("hi")], &[])
            .await
            .unwrap();
        assert_eq!(m1.text(), "first");

        let m2 = backend
            .complete(&[Message::human("hello")], &[])
            .await
            .unwrap();
        assert_eq!(m2.text(), "Echo: hello");
    }

    #[test]
    fn tool_call_message_has_unique_ids() {
        let (m1, id1) = ScriptedBackend::tool_call_message("x", serde_json::json!({}));
        let (_m2, id2) = ScriptedBackend::tool_call_message("x", serde_json::json!({}));
        assert_ne!(id1, id2);
        assert_eq!(m1.tool_calls[0].call_id, id1);
    }
}
