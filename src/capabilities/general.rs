//! 通用智能体：一次 LLM 调用直接完成任务
//!
//! 计划解析失败时的默认兜底目标（名称由 [orchestrator].default_capability 配置）。
//! 之前步骤的结果会作为参考附在 prompt 中。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::capabilities::{Capability, CapabilityDescriptor};
use crate::llm::{complete_within, LlmClient};
use crate::memory::Message;
use crate::orchestration::{ExecutionContext, StepResult, TargetType};

pub const GENERAL_AGENT: &str = "general-agent";

const SYSTEM_PROMPT: &str = "You are a capable general-purpose assistant working on one step of a larger plan. \
Complete the task directly and concisely. If earlier step results are provided, use them.";

pub struct GeneralAgent {
    descriptor: CapabilityDescriptor,
    llm: Arc<dyn LlmClient>,
    request_timeout: Duration,
}

impl GeneralAgent {
    pub fn new(llm: Arc<dyn LlmClient>, request_timeout: Duration) -> Self {
        Self::named(GENERAL_AGENT, llm, request_timeout)
    }

    /// 以其他名称注册（用于 default_capability 配成非默认名的场景）
    pub fn named(name: &str, llm: Arc<dyn LlmClient>, request_timeout: Duration) -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                name,
                TargetType::Agent,
                "General-purpose assistant for questions, writing and reasoning that no specialised capability covers.",
            )
            .with_examples([
                "Explain the difference between TCP and UDP",
                "Draft a polite reply declining the meeting",
            ]),
            llm,
            request_timeout,
        }
    }
}

#[async_trait]
impl Capability for GeneralAgent {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, task: &str, ctx: ExecutionContext) -> anyhow::Result<StepResult> {
        let mut user = String::new();
        if !ctx.prior_results.is_empty() {
            user.push_str("Earlier step results:\n");
            user.push_str(&ctx.prior_results.to_prompt_json());
            user.push_str("\n\n");
        }
        user.push_str("Task: ");
        user.push_str(task);

        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(user)];
        match complete_within(self.llm.as_ref(), &messages, self.request_timeout).await {
            Ok(text) if text.trim().is_empty() => {
                Ok(StepResult::ok(serde_json::json!({ "isEmpty": true })))
            }
            Ok(text) => Ok(StepResult::ok(text.trim().to_string())),
            Err(e) => Ok(StepResult::failure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::orchestration::PlanContext;

    fn exec() -> ExecutionContext {
        let mut ctx = PlanContext::new("u", "console", "m", tracing::Span::none());
        ctx.record("step_1", "calendar-agent", StepResult::ok("3 events"));
        ctx.execution_context(&[])
    }

    #[tokio::test]
    async fn test_answers_with_prior_results_in_prompt() {
        let llm = Arc::new(ScriptedLlmClient::new(["Sure: done"]));
        let agent = GeneralAgent::new(llm.clone(), Duration::from_secs(5));
        let res = agent.invoke("summarise", exec()).await.unwrap();
        assert!(res.success);
        assert_eq!(res.output, serde_json::json!("Sure: done"));
        let prompt = &llm.calls()[0][1].content;
        assert!(prompt.contains("3 events"));
        assert!(prompt.ends_with("Task: summarise"));
    }

    #[tokio::test]
    async fn test_llm_error_is_business_failure() {
        let llm = Arc::new(ScriptedLlmClient::default().then_error(LlmError::Request("down".into())));
        let agent = GeneralAgent::named("helper", llm, Duration::from_secs(5));
        assert_eq!(agent.descriptor().name, "helper");
        let res = agent.invoke("x", exec()).await.unwrap();
        assert!(!res.success);
        assert!(res.error.unwrap().contains("down"));
    }
}
