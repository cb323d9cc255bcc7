//! Mantis - Rust 编码智能体
//!
//! 入口：初始化日志、加载配置与凭证、打开对话存储、构建工具注册表
//! （本地 + MCP 发现），恢复线程后进入 REPL 主循环；退出前统一清理。

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use mantis::config::load_config;
use mantis::core::{ShutdownManager, ShutdownReason};
use mantis::llm::create_backend_from_config;
use mantis::memory::ConversationStore;
use mantis::tools::{register_remote_tools, FileReadTool, TestRunTool, ToolExecutor, ToolRegistry};
use mantis::turn::{TurnController, TurnEvent};
use mantis::{observability, ui};

/// 默认 system 策略（可被 config/prompts/system.txt 覆盖）
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a specialised agent for maintaining and developing codebases.

## Development Guidelines

1. Test failures:
   - When tests fail, fix the implementation first, not the tests.
   - Tests represent expected behavior; implementation should conform to tests.
   - Only modify tests if they clearly don't match specifications.

2. Code changes:
   - Make the smallest possible changes to fix issues.
   - Focus on fixing the specific problem rather than rewriting large portions.
   - Add unit tests for new functionality before implementing it.

3. Best practices:
   - Keep functions small with a single responsibility.
   - Implement proper error handling.
   - Be mindful of configuration dependencies in tests.

Ask for clarification when needed. Examine test failure messages carefully to
understand the root cause before making any changes."#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        mantis::config::AppConfig::default()
    });

    // 凭证与存储缺一不可：任一失败都拒绝启动
    let backend = create_backend_from_config(&cfg).context("Failed to create model backend")?;
    let store = Arc::new(
        ConversationStore::open(&cfg.app.db_path).context("Failed to open conversation store")?,
    );

    // 工作目录：配置 > 当前目录
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap());
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    let mut registry = ToolRegistry::new();
    registry.register(FileReadTool::new(&workspace));
    registry.register(TestRunTool::new(
        &workspace,
        cfg.tools.test_command.clone(),
        cfg.tools.tool_timeout_secs,
    ));
    let local_count = registry.len();
    let (remote_count, warnings, mcp_clients) =
        register_remote_tools(&mut registry, &cfg.tools.providers, cfg.tools.mcp_timeout_secs)
            .await;
    tracing::info!(
        local = local_count,
        remote = remote_count,
        "tool registry ready"
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel::<TurnEvent>();
    let renderer = ui::spawn_renderer(event_rx);
    for text in warnings {
        let _ = event_tx.send(TurnEvent::Warning { text });
    }

    let system_prompt = [
        "config/prompts/system.txt",
        "../config/prompts/system.txt",
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let controller = TurnController::resume(
        backend,
        ToolExecutor::new(registry, cfg.tools.tool_timeout_secs),
        Arc::clone(&store),
        &cfg.app.thread_id,
        system_prompt,
        &workspace,
        Some(event_tx.clone()),
    )
    .await
    .context("Failed to resume conversation")?;

    let run_result = run_repl(controller, &shutdown).await;

    // 清理：结束 MCP 子进程、关闭事件通道、把 WAL 刷回主库
    for client in &mcp_clients {
        client.shutdown().await;
    }
    drop(event_tx);
    let _ = renderer.await;
    if let Err(e) = store.checkpoint().await {
        tracing::warn!("Store checkpoint on shutdown failed: {}", e);
    }

    run_result
}

/// REPL 主循环：等待输入（可被关闭信号打断）-> 跑一个回合 -> 回到输入
///
/// 回合内的工具错误已被消化为 Tool 消息；process 返回 Err 的都是
/// 不可恢复错误（后端 / 存储），结束本次运行。已落盘的历史保持完整。
async fn run_repl(
    mut controller: TurnController,
    shutdown: &Arc<ShutdownManager>,
) -> anyhow::Result<()> {
    loop {
        let line = tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            line = ui::read_line("> ") => line,
        };
        let Some(line) = line else {
            break; // stdin EOF
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            break;
        }

        if let Err(e) = controller.process(input).await {
            return Err(e).context("Run ended on unrecoverable error");
        }
        if shutdown.is_shutdown() {
            break;
        }
    }
    Ok(())
}
