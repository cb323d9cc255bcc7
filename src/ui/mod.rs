//! 控制台展示与输入
//!
//! 渲染器消费 TurnEvent 并以样式化面板输出到 stdout；任何渲染失败都被忽略，
//! 绝不反向影响回合状态机。read_line 在阻塞线程上读取用户输入。

use std::io::Write;

use crossterm::style::Stylize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::turn::TurnEvent;

/// 输出一行；stdout 关闭或出错时静默丢弃
fn out(line: String) {
    let _ = writeln!(std::io::stdout(), "{}", line);
}

fn render(event: TurnEvent) {
    match event {
        TurnEvent::Greeting { text } => {
            out(format!("{}", "── Mantis ── Ready ──".green().bold()));
            out(format!("{}", text.green()));
        }
        TurnEvent::AssistantText { text } => {
            out(format!("{}", "── Assistant ──".magenta().bold()));
            out(text);
        }
        TurnEvent::ToolCallPreview { tool, args, .. } => {
            out(format!(
                "{} {} {}",
                "── Tool Use ──".cyan().bold(),
                tool.as_str().cyan(),
                args.to_string().dim()
            ));
        }
        TurnEvent::ToolResult { tool, preview } => {
            out(format!("{} {}", format!("── Tool Result ({}) ──", tool).cyan(), preview.dim()));
        }
        TurnEvent::ToolError { tool, reason } => {
            out(format!(
                "{} {}",
                format!("── Tool Error ({}) ──", tool).red().bold(),
                reason.red()
            ));
        }
        TurnEvent::Warning { text } => {
            out(format!("{}", format!("warning: {}", text).yellow()));
        }
        TurnEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cumulative_total,
        } => {
            out(format!(
                "{}",
                format!(
                    "tokens: {} prompt + {} completion = {} (cumulative {})",
                    prompt_tokens, completion_tokens, total_tokens, cumulative_total
                )
                .dim()
            ));
        }
        TurnEvent::Error { text } => {
            out(format!("{}", format!("error: {}", text).red().bold()));
        }
    }
}

/// 启动渲染任务：消费事件直到通道关闭
pub fn spawn_renderer(mut rx: UnboundedReceiver<TurnEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(event);
        }
    })
}

/// 打印提示符并读取一行用户输入；EOF 返回 None
pub async fn read_line(prompt: &str) -> Option<String> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", prompt);
        let _ = stdout.flush();

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}
