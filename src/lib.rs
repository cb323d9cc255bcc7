//! Mantis - Rust 编码智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与关闭信号
//! - **llm**: 模型后端抽象与实现（OpenAI 兼容 / Scripted Mock）
//! - **mcp**: MCP stdio 客户端（子进程 JSON-RPC：发现与调用）
//! - **memory**: 对话模型与 SQLite 持久化
//! - **tools**: 工具箱（file_read、test_run、MCP 代理）与执行器
//! - **turn**: 回合状态机（人类输入 -> 模型 -> 工具分发循环）
//! - **ui**: 控制台渲染与输入

pub mod config;
pub mod core;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod turn;
pub mod ui;
