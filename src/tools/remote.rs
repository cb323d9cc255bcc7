//! MCP 远程工具代理
//!
//! 把每个提供方 tools/list 发现的工具注册为普通 Tool，execute 转发 tools/call；
//! 某个提供方启动失败只损失它自己的工具并产生一条警告，不影响注册表其余部分。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderEntry;
use crate::mcp::{McpToolDefinition, StdioMcpClient};
use crate::tools::{Tool, ToolRegistry};

/// 远端工具：与本地工具同一 Tool 接口，调用时经共享连接转发
pub struct RemoteTool {
    name: String,
    description: String,
    parameters: Value,
    client: Arc<StdioMcpClient>,
}

impl RemoteTool {
    pub fn new(definition: McpToolDefinition, client: Arc<StdioMcpClient>) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            parameters: definition.input_schema,
            client,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.client
            .call_tool(&self.name, args)
            .await
            .map_err(|e| e.to_string())
    }
}

/// 启动全部配置的提供方并注册其工具
///
/// 返回 (注册的远端工具数, 启动失败提供方的警告文本, 存活连接)。
/// 连接需由调用方持有到进程结束，关闭时统一 shutdown。
pub async fn register_remote_tools(
    registry: &mut ToolRegistry,
    providers: &[ProviderEntry],
    request_timeout_secs: u64,
) -> (usize, Vec<String>, Vec<Arc<StdioMcpClient>>) {
    let mut registered = 0;
    let mut warnings = Vec::new();
    let mut clients = Vec::new();

    for entry in providers {
        if entry.transport != "stdio" {
            warnings.push(format!(
                "provider '{}': unsupported transport '{}', skipped",
                entry.id, entry.transport
            ));
            continue;
        }

        let client = match StdioMcpClient::spawn(
            &entry.id,
            &entry.command,
            &entry.args,
            &entry.env,
            request_timeout_secs,
        )
        .await
        {
            Ok(c) => Arc::new(c),
            Err(e) => {
                tracing::warn!(provider = %entry.id, error = %e, "MCP provider failed to launch");
                warnings.push(format!("provider '{}' failed to launch: {}", entry.id, e));
                continue;
            }
        };

        let tools = match client.list_tools().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(provider = %entry.id, error = %e, "MCP tool discovery failed");
                warnings.push(format!("provider '{}' discovery failed: {}", entry.id, e));
                client.shutdown().await;
                continue;
            }
        };

        for definition in tools {
            tracing::info!(provider = %entry.id, tool = %definition.name, "registered MCP tool");
            registry.register_arc(Arc::new(RemoteTool::new(definition, Arc::clone(&client))));
            registered += 1;
        }
        clients.push(client);
    }

    (registered, warnings, clients)
}
