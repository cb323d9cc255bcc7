//! Agent 错误类型
//!
//! 分两类：可在回合内恢复的工具错误（转为 Tool 消息继续循环），
//! 与不可恢复的后端 / 存储 / 凭证错误（上抛到进程边界）。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（后端、存储、凭证、工具）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型后端失败（网络 / 鉴权 / 响应格式）：不重试，结束本次运行
    #[error("Backend error: {0}")]
    Backend(String),

    /// 启动所需的凭证缺失：启动即失败
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// 对话存储无法打开：启动即失败（没有持久历史就不运行）
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// 对话存储读写失败
    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    /// 工具执行失败：转为 Tool 消息回给模型，循环继续
    #[error("Tool '{tool}' failed: {cause}")]
    ToolExecutionFailed { tool: String, cause: String },

    /// 工具超时
    #[error("Tool '{0}' timed out")]
    ToolTimeout(String),

    /// 模型请求了未注册的工具名
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl AgentError {
    /// 是否可在回合内恢复（工具类错误转为 Tool 消息，其余上抛）
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            AgentError::ToolExecutionFailed { .. }
                | AgentError::ToolTimeout(_)
                | AgentError::UnknownTool(_)
        )
    }

    /// 工具类错误的简短原因文本（写入 Tool 消息内容）
    pub fn tool_cause(&self) -> String {
        match self {
            AgentError::ToolExecutionFailed { cause, .. } => cause.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_are_recoverable() {
        assert!(AgentError::ToolTimeout("x".into()).is_tool_error());
        assert!(AgentError::UnknownTool("x".into()).is_tool_error());
        assert!(AgentError::ToolExecutionFailed {
            tool: "x".into(),
            cause: "boom".into()
        }
        .is_tool_error());
        assert!(!AgentError::Backend("down".into()).is_tool_error());
        assert!(!AgentError::Store("io".into()).is_tool_error());
    }
}
