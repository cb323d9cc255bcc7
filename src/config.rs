//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，
//! 如 `MANTIS__LLM__PROVIDER=openai`）。MCP 提供方列表 [[tools.providers]]
//! 启动时读取一次，不热更新。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：线程 id、数据库路径、工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 当前对话线程 id（显式传入每次存储调用，便于将来多线程会话）
    #[serde(default = "default_thread_id")]
    pub thread_id: String,
    /// 对话数据库路径
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// 工作目录，未设置时用当前目录下的 workspace
    pub workspace_root: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            thread_id: default_thread_id(),
            db_path: default_db_path(),
            workspace_root: None,
        }
    }
}

fn default_thread_id() -> String {
    "main".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("conversations.db")
}

/// [llm] 段：后端选择与采样参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek（均为 OpenAI 兼容端点）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

/// [tools] 段：工具超时、测试命令与 MCP 提供方列表
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// MCP 请求超时（秒），覆盖握手 / 发现 / 调用
    #[serde(default = "default_mcp_timeout_secs")]
    pub mcp_timeout_secs: u64,
    /// test_run 工具的测试命令（首项为程序）
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
    /// MCP 工具提供方（stdio 子进程）
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            mcp_timeout_secs: default_mcp_timeout_secs(),
            test_command: default_test_command(),
            providers: Vec::new(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_mcp_timeout_secs() -> u64 {
    30
}

fn default_test_command() -> Vec<String> {
    vec!["cargo".into(), "test".into()]
}

/// 单个 MCP 提供方：标识、启动命令与传输方式
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 目前仅支持 stdio
    #[serde(default = "default_transport")]
    pub transport: String,
    /// 额外注入子进程的环境变量
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_transport() -> String {
    "stdio".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
