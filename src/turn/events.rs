//! 回合过程事件：供展示层渲染助手文本、工具调用与错误
//!
//! 纯观察者通道：事件发送失败被忽略，绝不影响回合状态机。

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 空线程首次启动时的问候（仅展示，不入库）
    Greeting { text: String },
    /// 助手的文本回复
    AssistantText { text: String },
    /// 助手请求调用工具（执行前的预览）
    ToolCallPreview {
        tool: String,
        args: serde_json::Value,
        call_id: String,
    },
    /// 工具返回（预览，避免过长）
    ToolResult { tool: String, preview: String },
    /// 工具执行失败（以错误结果回给模型，循环继续）
    ToolError { tool: String, reason: String },
    /// 启动期警告（如某个 MCP 提供方未能启动）
    Warning { text: String },
    /// Token 使用统计（本回合增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        cumulative_total: u64,
    },
    /// 不可恢复错误（随后运行结束）
    Error { text: String },
}

/// 工具结果预览最大字符数
pub const TOOL_RESULT_PREVIEW_CHARS: usize = 200;

/// 截断为预览文本
pub fn preview(text: &str) -> String {
    let cut: String = text.chars().take(TOOL_RESULT_PREVIEW_CHARS).collect();
    if text.chars().count() > TOOL_RESULT_PREVIEW_CHARS {
        format!("{}...", cut)
    } else {
        cut
    }
}

/// 发送事件；通道关闭时静默丢弃
pub fn send_event(
    tx: &Option<tokio::sync::mpsc::UnboundedSender<TurnEvent>>,
    event: TurnEvent,
) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
