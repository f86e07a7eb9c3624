//! Switchboard 控制台入口
//!
//! 从 stdin 逐行读取用户消息，交给 Orchestrator 处理并把回复打印到 stdout；
//! 编排过程事件与日志写到 stderr。空行跳过，`/clear` 清空对话历史，`/quit` 退出。

use std::sync::Arc;

use anyhow::Context;
use switchboard::agent::{create_llm_from_config, create_orchestrator, default_registry};
use switchboard::config::{load_config, AppConfig};
use switchboard::memory::{ConversationMemory, Message};
use switchboard::orchestration::OrchestrationEvent;
use switchboard::{observability, OrchestrateRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

const CHANNEL: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);
    let registry = default_registry(&cfg, llm.clone());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<OrchestrationEvent>();
    let orchestrator = Arc::new(create_orchestrator(&cfg, llm, registry).with_events(event_tx));

    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&ev) {
                eprintln!("[event] {}", line);
            }
        }
    });

    let caller_id = std::env::var("USER").unwrap_or_else(|_| "console-user".to_string());
    let mut memory = ConversationMemory::with_max_messages(cfg.orchestrator.max_history_messages);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!(
        app = cfg.app.name.as_deref().unwrap_or("switchboard"),
        capabilities = ?orchestrator.registry().names(),
        "ready, reading messages from stdin"
    );

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                memory.clear();
                continue;
            }
            _ => {}
        }

        let request = OrchestrateRequest::new(input, &caller_id, CHANNEL)
            .with_history(memory.messages().to_vec());
        let result = orchestrator.orchestrate(request).await;
        if !result.success {
            tracing::warn!("request did not complete successfully");
        }

        stdout
            .write_all(format!("{}\n", result.response).as_bytes())
            .await?;
        stdout.flush().await?;

        memory.push(Message::user(input));
        memory.push(Message::assistant(result.response));
    }

    Ok(())
}
