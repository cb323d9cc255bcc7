//! 回合状态机集成测试
//!
//! 用 ScriptedBackend + 临时 SQLite 存储在无网络环境下验证：
//! 工具消息与 tool_calls 的一一对应、追加顺序、批内失败隔离、
//! 断点恢复与 MCP 部分发现失败。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mantis::config::ProviderEntry;
use mantis::llm::ScriptedBackend;
use mantis::memory::{ConversationStore, Message, Role, ToolCallRequest};
use mantis::tools::{register_remote_tools, Tool, ToolExecutor, ToolRegistry};
use mantis::turn::{TurnController, TurnEvent, TurnPhase};

struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "列出目录内容"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok("a.txt\nb.txt".to_string())
    }
}

/// 固定返回自身名字的工具，便于校验顺序
struct NamedTool(&'static str);

#[async_trait]
impl Tool for NamedTool {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "返回自身名字"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok(format!("output of {}", self.0))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "总是失败"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("simulated failure".to_string())
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest {
        call_id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

async fn controller(
    dir: &tempfile::TempDir,
    thread_id: &str,
    backend: ScriptedBackend,
    registry: ToolRegistry,
    event_tx: Option<tokio::sync::mpsc::UnboundedSender<TurnEvent>>,
) -> TurnController {
    let store = Arc::new(ConversationStore::open(dir.path().join("conversations.db")).unwrap());
    TurnController::resume(
        Arc::new(backend),
        ToolExecutor::new(registry, 10),
        store,
        thread_id,
        "You are a coding agent.".to_string(),
        dir.path(),
        event_tx,
    )
    .await
    .unwrap()
}

/// 规范中的端到端场景：list files -> 工具 -> 最终文本，校验持久化序列
#[tokio::test]
async fn scenario_list_files_persists_expected_sequence() {
    let dir = tempfile::tempdir().unwrap();

    let (call_msg, call_id) =
        ScriptedBackend::tool_call_message("list_dir", serde_json::json!({"path": "/tmp"}));
    let backend = ScriptedBackend::new(vec![
        call_msg,
        Message::assistant("Found 2 files: a.txt, b.txt"),
    ]);
    let mut registry = ToolRegistry::new();
    registry.register(ListDirTool);

    let mut ctl = controller(&dir, "t1", backend, registry, None).await;
    let reply = ctl.process("list files in /tmp").await.unwrap();
    assert_eq!(reply, "Found 2 files: a.txt, b.txt");
    assert_eq!(ctl.phase(), TurnPhase::AwaitingHumanInput);

    // 持久化序列（直接重开存储读取）
    let store = ConversationStore::open(dir.path().join("conversations.db")).unwrap();
    let persisted = store.load("t1").await.unwrap();
    assert_eq!(persisted.len(), 4);

    assert_eq!(persisted[0].role, Role::Human);
    assert_eq!(persisted[0].text(), "list files in /tmp");

    assert_eq!(persisted[1].role, Role::Assistant);
    assert_eq!(persisted[1].tool_calls.len(), 1);
    assert_eq!(persisted[1].tool_calls[0].name, "list_dir");

    assert_eq!(persisted[2].role, Role::Tool);
    assert_eq!(persisted[2].result_call_id(), Some(call_id.as_str()));
    assert_eq!(persisted[2].text(), "a.txt\nb.txt");

    assert_eq!(persisted[3].role, Role::Assistant);
    assert!(persisted[3].tool_calls.is_empty());
    assert_eq!(persisted[3].text(), "Found 2 files: a.txt, b.txt");
}

/// 每条 Assistant 的 k 个 tool_calls 在下一条 Assistant 前恰有 k 条 Tool 消息，
/// call_id 两两对应且互不重复
#[tokio::test]
async fn tool_message_count_matches_each_batch() {
    let dir = tempfile::tempdir().unwrap();

    let round1 = Message::assistant_with_tools(
        None,
        vec![
            call("c1", "alpha", serde_json::json!({})),
            call("c2", "beta", serde_json::json!({})),
        ],
    );
    let round2 =
        Message::assistant_with_tools(None, vec![call("c3", "alpha", serde_json::json!({}))]);
    let backend =
        ScriptedBackend::new(vec![round1, round2, Message::assistant("all done")]);

    let mut registry = ToolRegistry::new();
    registry.register(NamedTool("alpha"));
    registry.register(NamedTool("beta"));

    let mut ctl = controller(&dir, "t1", backend, registry, None).await;
    ctl.process("go").await.unwrap();

    let history = ctl.history();
    // Human, A(2 calls), Tool, Tool, A(1 call), Tool, A(text)
    assert_eq!(history.len(), 7);
    assert_eq!(history[1].tool_calls.len(), 2);
    assert_eq!(history[2].result_call_id(), Some("c1"));
    assert_eq!(history[3].result_call_id(), Some("c2"));
    assert_eq!(history[4].tool_calls.len(), 1);
    assert_eq!(history[5].result_call_id(), Some("c3"));
    assert_eq!(history[6].role, Role::Assistant);
}

/// 工具结果按请求顺序 [A, B, C] 追加
#[tokio::test]
async fn tool_results_append_in_request_order() {
    let dir = tempfile::tempdir().unwrap();

    let batch = Message::assistant_with_tools(
        None,
        vec![
            call("call-a", "alpha", serde_json::json!({})),
            call("call-b", "beta", serde_json::json!({})),
            call("call-c", "gamma", serde_json::json!({})),
        ],
    );
    let backend = ScriptedBackend::new(vec![batch, Message::assistant("done")]);

    let mut registry = ToolRegistry::new();
    registry.register(NamedTool("alpha"));
    registry.register(NamedTool("beta"));
    registry.register(NamedTool("gamma"));

    let mut ctl = controller(&dir, "t1", backend, registry, None).await;
    ctl.process("run all three").await.unwrap();

    let ids: Vec<&str> = ctl
        .history()
        .iter()
        .filter_map(|m| m.result_call_id())
        .collect();
    assert_eq!(ids, vec!["call-a", "call-b", "call-c"]);
}

/// B 失败不影响 A / C：三条 Tool 消息，B 为错误结果，循环继续到最终回复
#[tokio::test]
async fn failure_mid_batch_is_isolated() {
    let dir = tempfile::tempdir().unwrap();

    let batch = Message::assistant_with_tools(
        None,
        vec![
            call("call-a", "alpha", serde_json::json!({})),
            call("call-b", "flaky", serde_json::json!({})),
            call("call-c", "gamma", serde_json::json!({})),
        ],
    );
    let backend = ScriptedBackend::new(vec![batch, Message::assistant("recovered")]);

    let mut registry = ToolRegistry::new();
    registry.register(NamedTool("alpha"));
    registry.register(FailingTool);
    registry.register(NamedTool("gamma"));

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut ctl = controller(&dir, "t1", backend, registry, Some(event_tx)).await;
    let reply = ctl.process("run them").await.unwrap();
    assert_eq!(reply, "recovered");

    let history = ctl.history();
    let tools: Vec<&Message> = history.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tools.len(), 3);
    assert_eq!(tools[0].text(), "output of alpha");
    assert!(tools[1].text().starts_with("Error:"));
    assert!(tools[1].text().contains("simulated failure"));
    assert_eq!(tools[2].text(), "output of gamma");

    // 展示层收到对应的 ToolError 事件
    let mut saw_tool_error = false;
    while let Ok(ev) = event_rx.try_recv() {
        if let TurnEvent::ToolError { tool, .. } = ev {
            assert_eq!(tool, "flaky");
            saw_tool_error = true;
        }
    }
    assert!(saw_tool_error);
}

/// 断点恢复：重开进程（新的控制器 + 同一数据库）不丢失、不重复
#[tokio::test]
async fn resume_restores_history_exactly() {
    let dir = tempfile::tempdir().unwrap();

    {
        let backend = ScriptedBackend::new(vec![Message::assistant("hi there")]);
        let mut ctl = controller(&dir, "t1", backend, ToolRegistry::new(), None).await;
        ctl.process("hello").await.unwrap();
        assert_eq!(ctl.history().len(), 2);
    }

    // 第二个「进程」：恢复后继续对话
    let backend = ScriptedBackend::new(vec![Message::assistant("welcome back")]);
    let mut ctl = controller(&dir, "t1", backend, ToolRegistry::new(), None).await;
    assert_eq!(ctl.history().len(), 2);
    assert_eq!(ctl.history()[0].text(), "hello");
    assert_eq!(ctl.history()[1].text(), "hi there");

    ctl.process("back again").await.unwrap();
    assert_eq!(ctl.history().len(), 4);
    assert_eq!(ctl.history()[3].text(), "welcome back");
}

/// 模拟一个按行回应 JSON-RPC 的最小 MCP 服务端
fn fake_provider(id: &str) -> ProviderEntry {
    let script = [
        r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05"}}"#,
        r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"remote_echo","description":"echo back","inputSchema":{"type":"object"}}]}}"#,
        r#"{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}"#,
    ]
    .iter()
    .map(|l| format!("printf '%s\\n' '{l}';"))
    .collect::<Vec<_>>()
    .join(" ")
        + " cat >/dev/null";

    ProviderEntry {
        id: id.to_string(),
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        transport: "stdio".to_string(),
        env: HashMap::new(),
    }
}

/// 两个配置的提供方中有一个启动失败：注册表仍然完成构建，
/// 只包含存活提供方的工具，并产生一条警告
#[tokio::test]
async fn discovery_partial_failure_keeps_surviving_provider() {
    let providers = vec![
        fake_provider("good"),
        ProviderEntry {
            id: "broken".to_string(),
            command: "/nonexistent/mcp-server-binary".to_string(),
            args: vec![],
            transport: "stdio".to_string(),
            env: HashMap::new(),
        },
    ];

    let mut registry = ToolRegistry::new();
    registry.register(NamedTool("alpha"));
    let (registered, warnings, clients) =
        register_remote_tools(&mut registry, &providers, 5).await;

    assert_eq!(registered, 1);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("broken"));
    assert!(registry.get("remote_echo").is_some());
    assert!(registry.get("alpha").is_some());

    // 存活提供方的工具可以真正调用
    let out = registry
        .get("remote_echo")
        .unwrap()
        .execute(serde_json::json!({"text": "ping"}))
        .await
        .unwrap();
    assert_eq!(out, "pong");

    for client in &clients {
        client.shutdown().await;
    }
}
