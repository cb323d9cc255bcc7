//! LLM 层：模型后端抽象与实现（OpenAI 兼容 / DeepSeek 端点 / Scripted Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::ScriptedBackend;
pub use openai::{OpenAiBackend, TokenUsage};
pub use traits::ModelBackend;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;

/// DeepSeek 提供 OpenAI 兼容端点
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 根据配置选择后端并加载凭证；所需 API Key 缺失时启动失败，不降级
pub fn create_backend_from_config(cfg: &AppConfig) -> Result<Arc<dyn ModelBackend>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "deepseek" => {
            let api_key = std::env::var("DEEPSEEK_API_KEY")
                .map_err(|_| AgentError::MissingCredential("DEEPSEEK_API_KEY".into()))?;
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!("Using DeepSeek backend ({})", cfg.llm.model);
            Ok(Arc::new(OpenAiBackend::new(
                Some(base),
                &cfg.llm.model,
                &api_key,
                cfg.llm.temperature,
                cfg.llm.max_tokens,
            )))
        }
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| AgentError::MissingCredential("OPENAI_API_KEY".into()))?;
            tracing::info!("Using OpenAI backend ({})", cfg.llm.model);
            Ok(Arc::new(OpenAiBackend::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &api_key,
                cfg.llm.temperature,
                cfg.llm.max_tokens,
            )))
        }
        other => Err(AgentError::Config(format!("unknown llm provider: {other}"))),
    }
}
