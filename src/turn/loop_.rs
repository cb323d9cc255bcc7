//! 回合状态机
//!
//! AwaitingHumanInput -> AwaitingModelResponse -> {DispatchingTools -> AwaitingModelResponse}* -> AwaitingHumanInput。
//! 每条消息追加后立即落盘；同一批 tool_calls 严格按请求顺序依次执行，
//! 单个失败不中断其余调用，全部解决后才回到模型。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::AgentError;
use crate::llm::ModelBackend;
use crate::memory::{Conversation, ConversationStore, Message};
use crate::tools::ToolExecutor;
use crate::turn::events::{preview, send_event, TurnEvent};

/// 单个人类回合内最大模型往返次数，防止工具循环失控
const MAX_TOOL_ROUNDS: usize = 25;

/// 空线程首次启动时的问候语
const GREETING: &str = "What can I do for you?";

/// 回合状态机的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// 等待人类输入（初始状态）
    AwaitingHumanInput,
    /// 等待模型回复
    AwaitingModelResponse,
    /// 按请求顺序执行当前批次的工具调用
    DispatchingTools,
}

/// 回合控制器：持有后端、执行器、存储与当前线程的对话
pub struct TurnController {
    backend: Arc<dyn ModelBackend>,
    executor: ToolExecutor,
    store: Arc<ConversationStore>,
    conversation: Conversation,
    system_prompt: String,
    workspace: PathBuf,
    event_tx: Option<UnboundedSender<TurnEvent>>,
    phase: TurnPhase,
}

impl TurnController {
    /// 从存储恢复线程历史；空线程时向展示层发送问候（不入库）
    pub async fn resume(
        backend: Arc<dyn ModelBackend>,
        executor: ToolExecutor,
        store: Arc<ConversationStore>,
        thread_id: &str,
        system_prompt: String,
        workspace: impl AsRef<Path>,
        event_tx: Option<UnboundedSender<TurnEvent>>,
    ) -> Result<Self, AgentError> {
        let history = store.load(thread_id).await?;
        if history.is_empty() {
            send_event(
                &event_tx,
                TurnEvent::Greeting {
                    text: GREETING.to_string(),
                },
            );
        } else {
            tracing::info!(
                thread = %thread_id,
                messages = history.len(),
                "resumed conversation"
            );
        }

        Ok(Self {
            backend,
            executor,
            store,
            conversation: Conversation::from_messages(thread_id, history),
            system_prompt,
            workspace: workspace.as_ref().to_path_buf(),
            event_tx,
            phase: TurnPhase::AwaitingHumanInput,
        })
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// 追加消息：先落盘，成功后进入内存历史
    async fn append(&mut self, message: Message) -> Result<(), AgentError> {
        self.store
            .append(self.conversation.thread_id(), std::slice::from_ref(&message))
            .await?;
        self.conversation.push(message);
        Ok(())
    }

    /// 组装完整 prompt：固定 system 策略 + 工作目录上下文 + 全部历史
    fn compose_prompt(&self) -> Vec<Message> {
        let mut prompt = Vec::with_capacity(self.conversation.len() + 2);
        prompt.push(Message::system(&self.system_prompt));
        prompt.push(Message::human(format!(
            "Working directory: {}",
            self.workspace.display()
        )));
        prompt.extend(self.conversation.messages().iter().cloned());
        prompt
    }

    /// 处理一条人类输入：跑完模型/工具循环直到纯文本回复，返回该文本
    ///
    /// Backend 错误不重试，直接上抛（已落盘的消息保持持久）。
    pub async fn process(&mut self, input: &str) -> Result<String, AgentError> {
        self.append(Message::human(input)).await?;
        self.phase = TurnPhase::AwaitingModelResponse;

        let (prompt0, completion0, _) = self.backend.token_usage();
        let mut rounds = 0;

        loop {
            let descriptors = self.executor.registry().descriptors();
            let assistant = match self
                .backend
                .complete(&self.compose_prompt(), &descriptors)
                .await
            {
                Ok(m) => m,
                Err(e) => {
                    send_event(&self.event_tx, TurnEvent::Error { text: e.to_string() });
                    self.phase = TurnPhase::AwaitingHumanInput;
                    return Err(e);
                }
            };

            let text = assistant.text();
            let tool_calls = assistant.tool_calls.clone();
            self.append(assistant).await?;

            if !text.is_empty() {
                send_event(&self.event_tx, TurnEvent::AssistantText { text: text.clone() });
            }
            for tc in &tool_calls {
                send_event(
                    &self.event_tx,
                    TurnEvent::ToolCallPreview {
                        tool: tc.name.clone(),
                        args: tc.arguments.clone(),
                        call_id: tc.call_id.clone(),
                    },
                );
            }

            if tool_calls.is_empty() {
                self.emit_token_usage(prompt0, completion0);
                self.phase = TurnPhase::AwaitingHumanInput;
                return Ok(text);
            }

            // 本批次全部调用按请求顺序解决后才回到模型
            self.phase = TurnPhase::DispatchingTools;
            for tc in &tool_calls {
                let message = match self.executor.execute(&tc.name, tc.arguments.clone()).await {
                    Ok(content) => {
                        send_event(
                            &self.event_tx,
                            TurnEvent::ToolResult {
                                tool: tc.name.clone(),
                                preview: preview(&content),
                            },
                        );
                        Message::tool_result(&tc.call_id, content)
                    }
                    Err(e) => {
                        send_event(
                            &self.event_tx,
                            TurnEvent::ToolError {
                                tool: tc.name.clone(),
                                reason: e.tool_cause(),
                            },
                        );
                        Message::tool_error(&tc.call_id, e.to_string())
                    }
                };
                self.append(message).await?;
            }
            self.phase = TurnPhase::AwaitingModelResponse;

            rounds += 1;
            if rounds >= MAX_TOOL_ROUNDS {
                let notice = format!(
                    "Reached the tool-round limit ({}) for this turn; awaiting further instructions.",
                    MAX_TOOL_ROUNDS
                );
                send_event(&self.event_tx, TurnEvent::AssistantText { text: notice.clone() });
                self.emit_token_usage(prompt0, completion0);
                self.phase = TurnPhase::AwaitingHumanInput;
                return Ok(notice);
            }
        }
    }

    fn emit_token_usage(&self, prompt0: u64, completion0: u64) {
        let (prompt, completion, total) = self.backend.token_usage();
        if total == 0 {
            return;
        }
        send_event(
            &self.event_tx,
            TurnEvent::TokenUsage {
                prompt_tokens: prompt.saturating_sub(prompt0),
                completion_tokens: completion.saturating_sub(completion0),
                total_tokens: prompt.saturating_sub(prompt0) + completion.saturating_sub(completion0),
                cumulative_total: total,
            },
        );
    }
}
