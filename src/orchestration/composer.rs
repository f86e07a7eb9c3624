//! Composer：根据全部步骤结果合成一条最终回复
//!
//! 一次 LLM 调用，取回复中的第一段文本。没有可用文本（空回复、LLM 出错或超时）时：
//! 在最近一批步骤/工具结果里找生成的资源链接，找到则套用模板回复，否则返回固定的致歉语。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::core::OrchestratorError;
use crate::llm::{complete_within, LlmClient};
use crate::memory::Message;
use crate::orchestration::{StepRecord, StepResults};

pub const DEFAULT_COMPOSER_PROMPT: &str = "You are the reply writer of a personal assistant that talks to users over a messaging channel. \
Using the step results provided, answer the user's request in a short, friendly message. \
Never invent data that is not in the results. If some steps failed, say plainly what was done and what could not be done.";

pub const GENERIC_FAILURE_REPLY: &str =
    "Sorry, I couldn't complete that request. Please try again in a moment.";

const LINK_REPLY_PREFIX: &str = "I've put that together for you. You can open it here: ";

/// 对象上优先识别为「生成链接」的字段
const LINK_KEYS: &[&str] = &["url", "link", "pageUrl", "page_url", "previewUrl", "shareUrl"];

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>)\]]+"#).expect("static regex"))
}

/// 回复来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Llm,
    LinkFallback,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReply {
    pub text: String,
    pub source: ReplySource,
}

impl ComposedReply {
    pub fn is_fallback(&self) -> bool {
        self.source != ReplySource::Llm
    }
}

/// 合成输入
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    pub task: &'a str,
    pub history: &'a [Message],
    pub goal: Option<&'a str>,
    pub results: &'a StepResults,
}

/// 取回复正文：去掉开头的 <think> 推理块；剩余为空则视为无可用文本
pub fn first_text_segment(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    if text.starts_with("<think>") {
        text = match text.find("</think>") {
            Some(end) => text[end + "</think>".len()..].trim(),
            None => "",
        };
    }
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn link_in_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => LINK_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .filter_map(Value::as_str)
            .find(|s| s.starts_with("http://") || s.starts_with("https://"))
            .map(String::from)
            .or_else(|| map.values().find_map(link_in_value)),
        Value::Array(items) => items.iter().find_map(link_in_value),
        Value::String(s) => url_regex()
            .find(s)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_string()),
        _ => None,
    }
}

/// 在一批结果里从新到旧查找生成的链接（先看工具调用输出，再看步骤输出）
pub fn find_generated_link(batch: &[StepRecord]) -> Option<String> {
    batch.iter().rev().find_map(|record| {
        record
            .result
            .tool_calls
            .iter()
            .rev()
            .find_map(|call| link_in_value(&call.output))
            .or_else(|| link_in_value(&record.result.output))
    })
}

/// 无可用文本时的确定性兜底
pub fn fallback_reply(results: &StepResults) -> ComposedReply {
    match find_generated_link(results.latest_batch()) {
        Some(link) => ComposedReply {
            text: format!("{}{}", LINK_REPLY_PREFIX, link),
            source: ReplySource::LinkFallback,
        },
        None => ComposedReply {
            text: GENERIC_FAILURE_REPLY.to_string(),
            source: ReplySource::Generic,
        },
    }
}

pub struct Composer {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    request_timeout: Duration,
    max_history: usize,
}

impl Composer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            request_timeout,
            max_history: 20,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn build_messages(&self, req: &ComposeRequest<'_>) -> Vec<Message> {
        let mut user = String::new();

        if !req.history.is_empty() {
            user.push_str("Conversation so far:\n");
            let skip = req.history.len().saturating_sub(self.max_history);
            for m in &req.history[skip..] {
                user.push_str(&format!("- {}: {}\n", m.role.as_str(), m.content));
            }
            user.push('\n');
        }

        user.push_str(&format!("User request:\n{}\n\n", req.task));
        if let Some(goal) = req.goal.filter(|g| !g.is_empty()) {
            user.push_str(&format!("Plan goal: {}\n\n", goal));
        }
        user.push_str("Step results:\n");
        user.push_str(&req.results.to_prompt_json());
        user.push('\n');

        let failed: Vec<&str> = req
            .results
            .unresolved_failures()
            .map(|r| r.step_id.as_str())
            .collect();
        if !failed.is_empty() {
            user.push_str(&format!(
                "\nSome steps did not complete ({}). Tell the user what was done and what could not be done.\n",
                failed.join(", ")
            ));
        }

        vec![Message::system(self.system_prompt.clone()), Message::user(user)]
    }

    /// 合成最终回复；从不失败
    pub async fn compose(&self, req: &ComposeRequest<'_>) -> ComposedReply {
        let messages = self.build_messages(req);
        let outcome = complete_within(self.llm.as_ref(), &messages, self.request_timeout)
            .await
            .map_err(OrchestratorError::from)
            .and_then(|raw| first_text_segment(&raw).ok_or(OrchestratorError::ComposerEmpty));

        match outcome {
            Ok(text) => ComposedReply {
                text,
                source: ReplySource::Llm,
            },
            Err(e) => {
                let reply = fallback_reply(req.results);
                tracing::warn!(
                    error_kind = e.kind(),
                    error = %e,
                    source = ?reply.source,
                    "composer produced no usable text, using fallback reply"
                );
                reply
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::orchestration::{PlanContext, StepResult, ToolCallRecord};
    use serde_json::json;

    fn ctx() -> PlanContext {
        PlanContext::new("u", "c", "m", tracing::Span::none())
    }

    fn composer(llm: Arc<ScriptedLlmClient>) -> Composer {
        Composer::new(llm, DEFAULT_COMPOSER_PROMPT, Duration::from_secs(5))
    }

    #[test]
    fn test_first_text_segment() {
        assert_eq!(first_text_segment("  hi \n"), Some("hi".to_string()));
        assert_eq!(first_text_segment("<think>hmm</think>\nYou have 3."), Some("You have 3.".to_string()));
        assert_eq!(first_text_segment("<think>never closed"), None);
        assert_eq!(first_text_segment("   "), None);
    }

    #[test]
    fn test_link_found_in_tool_output() {
        let mut c = ctx();
        c.record(
            "step_1",
            "page-agent",
            StepResult::ok("done").with_tool_calls(vec![ToolCallRecord {
                name: "publish".into(),
                input: json!({}),
                output: json!({"status": "ok", "pageUrl": "https://pages.example.com/p/42"}),
            }]),
        );
        let reply = fallback_reply(c.step_results());
        assert_eq!(reply.source, ReplySource::LinkFallback);
        assert!(reply.text.ends_with("https://pages.example.com/p/42"));
    }

    #[test]
    fn test_link_found_in_prose_output() {
        let mut c = ctx();
        c.record("step_1", "x", StepResult::ok("Created: https://files.example.com/a.pdf."));
        let reply = fallback_reply(c.step_results());
        assert!(reply.text.ends_with("https://files.example.com/a.pdf"));
    }

    #[test]
    fn test_only_latest_batch_is_scanned() {
        let mut c = ctx();
        c.record("step_1", "x", StepResult::ok(json!({"url": "https://old.example.com"})));
        c.begin_replan();
        c.record("step_9", "x", StepResult::failure("nope"));
        let reply = fallback_reply(c.step_results());
        assert_eq!(reply.source, ReplySource::Generic);
        assert_eq!(reply.text, GENERIC_FAILURE_REPLY);
    }

    #[tokio::test]
    async fn test_compose_uses_llm_text() {
        let llm = Arc::new(ScriptedLlmClient::new(["You have 3 events today."]));
        let mut c = ctx();
        c.record("step_1", "calendar-agent", StepResult::ok("Found 3 events"));
        let req = ComposeRequest {
            task: "what's on today",
            history: &[],
            goal: Some("List events"),
            results: c.step_results(),
        };
        let reply = composer(llm.clone()).compose(&req).await;
        assert_eq!(reply.text, "You have 3 events today.");
        assert!(!reply.is_fallback());
        let user = &llm.calls()[0][1].content;
        assert!(user.contains("Found 3 events"));
        assert!(user.contains("Plan goal: List events"));
        assert!(!user.contains("did not complete"));
    }

    #[tokio::test]
    async fn test_compose_mentions_partial_failure() {
        let llm = Arc::new(ScriptedLlmClient::new(["Partly done."]));
        let mut c = ctx();
        c.record("step_1", "a", StepResult::ok("ok"));
        c.record("step_2", "ghost-agent", StepResult::failure("Unknown capability: ghost-agent"));
        let req = ComposeRequest {
            task: "t",
            history: &[],
            goal: None,
            results: c.step_results(),
        };
        composer(llm.clone()).compose(&req).await;
        assert!(llm.calls()[0][1].content.contains("did not complete (step_2)"));
    }

    #[tokio::test]
    async fn test_recovered_failure_is_not_reported() {
        let llm = Arc::new(ScriptedLlmClient::new(["All done."]));
        let mut c = ctx();
        c.record("step_1", "ghost-agent", StepResult::failure("Unknown capability: ghost-agent"));
        c.begin_replan();
        c.record("step_3", "a", StepResult::ok("ok"));
        c.record("step_4", "b", StepResult::ok("ok"));
        let req = ComposeRequest {
            task: "t",
            history: &[],
            goal: None,
            results: c.step_results(),
        };
        composer(llm.clone()).compose(&req).await;
        let user = &llm.calls()[0][1].content;
        assert!(user.contains("\"step_1\""));
        assert!(!user.contains("did not complete"));
    }

    #[tokio::test]
    async fn test_compose_falls_back_on_empty_or_error() {
        let mut c = ctx();
        c.record("step_1", "page-agent", StepResult::ok(json!({"link": "https://example.com/page"})));
        let req = ComposeRequest {
            task: "make me a page",
            history: &[],
            goal: None,
            results: c.step_results(),
        };

        let reply = composer(Arc::new(ScriptedLlmClient::new(["   "]))).compose(&req).await;
        assert_eq!(reply.source, ReplySource::LinkFallback);

        let llm = Arc::new(ScriptedLlmClient::default().then_error(LlmError::Timeout(60)));
        let reply = composer(llm).compose(&req).await;
        assert!(reply.text.contains("https://example.com/page"));
    }
}
