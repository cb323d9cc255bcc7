//! 测试运行工具
//!
//! 以子进程运行配置的测试命令（默认 cargo test），带超时，
//! 返回通过 / 失败摘要与截尾后的输出，供模型判断下一步修复动作。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// 输出保留的最大字符数（保留尾部，失败信息通常在结尾）
const MAX_OUTPUT_CHARS: usize = 12000;

/// 测试运行工具
pub struct TestRunTool {
    project_root: PathBuf,
    /// 测试命令（首项为程序，其余为参数）
    command: Vec<String>,
    timeout_secs: u64,
}

impl TestRunTool {
    pub fn new(project_root: impl AsRef<Path>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            command,
            timeout_secs,
        }
    }
}

/// 超长输出只保留尾部
fn tail(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    let kept: String = chars[chars.len() - MAX_OUTPUT_CHARS..].iter().collect();
    format!("... (output truncated)\n{}", kept)
}

#[async_trait]
impl Tool for TestRunTool {
    fn name(&self) -> &str {
        "test_run"
    }

    fn description(&self) -> &str {
        r#"运行项目测试套件。

参数:
- filter: 只运行名称匹配该子串的测试（可选）

返回: 测试结果摘要（通过/失败、退出码与输出）

示例:
{"filter": "store"}"#
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "测试名过滤子串"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let (program, base_args) = self
            .command
            .split_first()
            .ok_or("test command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(base_args);
        cmd.current_dir(&self.project_root);

        if let Some(filter) = args.get("filter").and_then(|v| v.as_str()) {
            if !filter.is_empty() {
                cmd.arg(filter);
            }
        }

        let output = tokio::time::timeout(
            tokio::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| format!("test run timed out after {}s", self.timeout_secs))?
        .map_err(|e| format!("failed to run tests: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let mut result = format!(
            "Test Result: {}\nExit Code: {}\n\n",
            if success { "PASSED" } else { "FAILED" },
            exit_code
        );
        if !stdout.is_empty() {
            result.push_str("STDOUT:\n");
            result.push_str(&tail(&stdout));
            result.push('\n');
        }
        if !stderr.is_empty() {
            result.push_str("STDERR:\n");
            result.push_str(&tail(&stderr));
        }

        // 失败也作为成功的工具结果返回：模型需要看到失败输出来决定修复
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passing_command_reports_passed() {
        let tool = TestRunTool::new(".", vec!["true".to_string()], 10);
        let out = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("PASSED"));
        assert!(out.contains("Exit Code: 0"));
    }

    #[tokio::test]
    async fn failing_command_reports_failed_but_is_not_a_tool_error() {
        let tool = TestRunTool::new(".", vec!["false".to_string()], 10);
        let out = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("FAILED"));
    }

    #[tokio::test]
    async fn missing_program_is_a_tool_error() {
        let tool = TestRunTool::new(".", vec!["definitely-not-a-binary-xyz".to_string()], 10);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[test]
    fn tail_keeps_the_end_of_long_output() {
        let long = "a".repeat(MAX_OUTPUT_CHARS + 100) + "END";
        let t = tail(&long);
        assert!(t.starts_with("... (output truncated)"));
        assert!(t.ends_with("END"));
    }
}
