//! 文件读取工具
//!
//! 读取工作区内的文件并返回带行号的内容；相对路径相对工作区根解析，
//! 路径穿越到工作区外的请求被拒绝。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 文件读取工具
pub struct FileReadTool {
    /// 允许的根目录（工作区）
    workspace_root: PathBuf,
    /// 单次最多返回的行数
    max_lines: usize,
}

impl FileReadTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
            max_lines: 2000,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    /// 解析并校验路径：相对路径相对工作区根，结果必须仍在工作区内
    fn validate_path(&self, file_path: &str) -> Result<PathBuf, String> {
        let path = Path::new(file_path);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        let canonical = absolute.canonicalize().unwrap_or(absolute);
        let root = self
            .workspace_root
            .canonicalize()
            .unwrap_or_else(|_| self.workspace_root.clone());

        if !canonical.starts_with(&root) {
            return Err(format!(
                "Access denied: path '{}' is outside workspace '{}'",
                file_path,
                self.workspace_root.display()
            ));
        }
        Ok(canonical)
    }

    /// 读取内容并加行号；offset 为 0-based 起始行
    fn read_with_line_numbers(
        &self,
        path: &Path,
        offset: usize,
        limit: usize,
    ) -> Result<String, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;

        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        if offset >= total && total > 0 {
            return Ok(format!(
                "File '{}' has {} lines. Requested offset {} is beyond end.",
                path.display(),
                total,
                offset
            ));
        }

        let end = (offset + limit).min(total);
        let mut result = format!(
            "File: {} (lines {}-{} of {})\n",
            path.display(),
            offset + 1,
            end,
            total
        );
        for (i, line) in lines[offset..end].iter().enumerate() {
            result.push_str(&format!("{:4}: {}\n", offset + i + 1, line));
        }
        if end < total {
            result.push_str(&format!(
                "\n... ({} more lines, use offset={} to continue)\n",
                total - end,
                end + 1
            ));
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        r#"读取文件内容，返回带行号的文本。

参数:
- file_path: 文件路径（相对工作区根目录或绝对路径）
- offset: 起始行号（从1开始，可选，默认1）
- limit: 最大读取行数（可选，默认全部）

返回: 带行号的文件内容

示例:
{"file_path": "src/main.rs", "offset": 1, "limit": 50}"#
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "文件路径，相对工作区根目录或绝对路径"
                },
                "offset": {
                    "type": "integer",
                    "description": "起始行号（从1开始）"
                },
                "limit": {
                    "type": "integer",
                    "description": "最大读取行数"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: file_path")?;

        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(1)
            .saturating_sub(1);

        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(self.max_lines)
            .min(self.max_lines);

        let path = self.validate_path(file_path)?;
        if !path.exists() {
            return Err(format!("File not found: {}", path.display()));
        }
        if !path.is_file() {
            return Err(format!("Path is not a file: {}", path.display()));
        }

        self.read_with_line_numbers(&path, offset, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FileReadTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "line one\nline two\nline three\n")
            .unwrap();
        let tool = FileReadTool::new(dir.path());
        (dir, tool)
    }

    #[tokio::test]
    async fn reads_relative_path_with_line_numbers() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(serde_json::json!({"file_path": "src/lib.rs"}))
            .await
            .unwrap();
        assert!(out.contains("   1: line one"));
        assert!(out.contains("   3: line three"));
    }

    #[tokio::test]
    async fn offset_and_limit_select_a_window() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(serde_json::json!({"file_path": "src/lib.rs", "offset": 2, "limit": 1}))
            .await
            .unwrap();
        assert!(out.contains("   2: line two"));
        assert!(!out.contains("line one"));
        assert!(out.contains("1 more lines"));
    }

    #[tokio::test]
    async fn path_escape_is_rejected() {
        let (_dir, tool) = setup();
        let result = tool
            .execute(serde_json::json!({"file_path": "../../../etc/passwd"}))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Access denied"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let (_dir, tool) = setup();
        let result = tool
            .execute(serde_json::json!({"file_path": "src/nope.rs"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_parameter_is_an_error() {
        let (_dir, tool) = setup();
        let result = tool.execute(serde_json::json!({})).await;
        assert_eq!(
            result.unwrap_err(),
            "Missing required parameter: file_path"
        );
    }
}
