//! MCP（Model Context Protocol）stdio 客户端
//!
//! 按配置启动外部工具提供方子进程，经 stdin/stdout JSON-RPC 完成
//! initialize 握手、tools/list 发现与 tools/call 调用。

pub mod client;
pub mod protocol;

pub use client::StdioMcpClient;
pub use protocol::McpToolDefinition;

use thiserror::Error;

/// MCP 客户端错误
#[derive(Error, Debug)]
pub enum McpError {
    /// 子进程启动失败：该提供方贡献零个工具，不影响其余注册
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
