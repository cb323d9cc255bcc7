//! 对话模型：消息、内容块与工具调用请求
//!
//! 一条消息 = 角色 + 内容块序列 +（仅 Assistant）工具调用请求。
//! Tool 消息通过 call_id 与前一条 Assistant 的某个 tool_call 对应；
//! 在下一条 Assistant 产生前，每个 tool_call 必须被恰好一条 Tool 消息解决。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致；Human 对应 API 中的 user）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

/// 模型发出的工具调用请求（随 Assistant 消息出现，按 call_id 关联结果）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// 内容块：纯文本，或某次工具调用的结果
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolResult {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    /// 仅 Assistant 消息可非空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::Text {
                text: content.into(),
            }],
            tool_calls: Vec::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: vec![ContentBlock::Text {
                text: content.into(),
            }],
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text {
                text: content.into(),
            }],
            tool_calls: Vec::new(),
        }
    }

    /// 携带工具调用请求的 Assistant 消息；text 为空时不含文本块
    pub fn assistant_with_tools(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut content = Vec::new();
        if let Some(text) = text {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
        }
    }

    /// 某次工具调用的成功结果
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                call_id: call_id.into(),
                content: content.into(),
                is_error: false,
            }],
            tool_calls: Vec::new(),
        }
    }

    /// 某次工具调用的失败结果（模型可看到错误原因并决定下一步）
    pub fn tool_error(call_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                call_id: call_id.into(),
                content: format!("Error: {}", cause.into()),
                is_error: true,
            }],
            tool_calls: Vec::new(),
        }
    }

    /// 拼接消息中全部文本块（Tool 消息则为结果内容）
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.as_str(),
                ContentBlock::ToolResult { content, .. } => content.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool 消息对应的 call_id（非 Tool 消息返回 None）
    pub fn result_call_id(&self) -> Option<&str> {
        if self.role != Role::Tool {
            return None;
        }
        self.content.iter().find_map(|b| match b {
            ContentBlock::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
    }
}

/// 单线程对话历史：仅追加，已追加的消息不再修改或删除
#[derive(Clone, Debug)]
pub struct Conversation {
    thread_id: String,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
        }
    }

    /// 从持久化历史恢复
    pub fn from_messages(thread_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 最后一条 Assistant 消息中尚未被 Tool 消息解决的 call_id，按请求顺序返回
    pub fn unresolved_call_ids(&self) -> Vec<String> {
        let Some(last_assistant) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };
        let requested = &self.messages[last_assistant].tool_calls;
        if requested.is_empty() {
            return Vec::new();
        }
        let resolved: Vec<&str> = self.messages[last_assistant + 1..]
            .iter()
            .filter_map(|m| m.result_call_id())
            .collect();
        requested
            .iter()
            .filter(|tc| !resolved.contains(&tc.call_id.as_str()))
            .map(|tc| tc.call_id.clone())
            .collect()
    }
}
