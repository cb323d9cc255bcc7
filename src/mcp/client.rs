//! MCP stdio 客户端：子进程 + 行分隔 JSON-RPC
//!
//! spawn 时完成 initialize 握手；之后 list_tools / call_tool 共用同一连接。
//! 响应按 id 匹配，跳过服务端通知与日志行。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use crate::mcp::protocol::*;
use crate::mcp::McpError;

/// 单个提供方的 stdio 连接
pub struct StdioMcpClient {
    provider_id: String,
    next_id: AtomicU64,
    request_timeout: Duration,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Option<Child>>,
}

impl StdioMcpClient {
    /// 启动提供方子进程并完成 initialize 握手
    pub async fn spawn(
        provider_id: &str,
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout_secs: u64,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;

        let client = Self {
            provider_id: provider_id.to_string(),
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_secs(request_timeout_secs),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(Some(child)),
        };

        client.initialize().await?;
        Ok(client)
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// initialize 握手 + initialized 通知
    async fn initialize(&self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: "2024-11-05".into(),
            capabilities: ClientCapabilities {},
            client_info: ClientInfo {
                name: "mantis".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let response = self
            .send_request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        debug!(
            provider = %self.provider_id,
            response = %response,
            "MCP provider initialized"
        );

        self.send_notification(JsonRpcNotification::new("notifications/initialized"))
            .await
    }

    /// 发送请求并等待匹配 id 的响应
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await?;
        }

        let response = tokio::time::timeout(self.request_timeout, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout)??;

        response.into_result()
    }

    async fn send_notification(&self, notif: JsonRpcNotification) -> Result<(), McpError> {
        let mut line = serde_json::to_string(&notif)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// 读 stdout 直到出现匹配 id 的响应；通知与非 JSON 行跳过
    async fn read_response(&self, expected_id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut stdout = self.stdout.lock().await;
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = stdout.read_line(&mut buf).await?;
            if n == 0 {
                return Err(McpError::Transport("provider closed stdout".into()));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
                Ok(resp) => {
                    debug!(
                        provider = %self.provider_id,
                        id = ?resp.id,
                        "skipping non-matching JSON-RPC message"
                    );
                }
                Err(_) => {
                    debug!(
                        provider = %self.provider_id,
                        line = trimmed,
                        "ignoring non-JSON-RPC line from provider"
                    );
                }
            }
        }
    }

    /// tools/list：该提供方暴露的全部工具定义
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.send_request("tools/list", None).await?;
        let tools_value = result
            .get("tools")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));
        serde_json::from_value(tools_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools list: {e}")))
    }

    /// tools/call：调用远端工具并把文本内容拼为单个字符串
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, McpError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        let call_result: ToolCallResult =
            serde_json::from_value(result).unwrap_or(ToolCallResult {
                content: vec![],
                is_error: false,
            });

        let text = call_result
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if call_result.is_error {
            return Err(McpError::Protocol(format!("tool error: {text}")));
        }
        Ok(text)
    }

    /// 结束子进程
    pub async fn shutdown(&self) {
        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 用 sh 预打印响应行模拟一个最小 MCP 服务端：
    /// initialize(id=1) / tools/list(id=2) / tools/call(id=3)
    fn fake_server_script() -> String {
        [
            r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"remote_echo","description":"echo back","inputSchema":{"type":"object"}}]}}"#,
            r#"{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}"#,
        ]
        .iter()
        .map(|l| format!("printf '%s\\n' '{l}';"))
        .collect::<Vec<_>>()
        .join(" ")
            + " cat >/dev/null"
    }

    #[tokio::test]
    async fn spawn_discover_and_call_against_fake_server() {
        let client = StdioMcpClient::spawn(
            "fake",
            "sh",
            &["-c".to_string(), fake_server_script()],
            &HashMap::new(),
            5,
        )
        .await
        .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "remote_echo");

        let out = client
            .call_tool("remote_echo", serde_json::json!({"text": "ping"}))
            .await
            .unwrap();
        assert_eq!(out, "pong");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn spawn_failure_reports_spawn_failed() {
        let result = StdioMcpClient::spawn(
            "missing",
            "/nonexistent/mcp-server-binary",
            &[],
            &HashMap::new(),
            5,
        )
        .await;
        assert!(matches!(result, Err(McpError::SpawnFailed(_))));
    }
}
