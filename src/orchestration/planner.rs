//! Planner：拼装规划 prompt 并调用 LLM，返回原始文本（由 parser 负责校验）
//!
//! system = 基础 prompt + 能力目录 + 计划 JSON Schema + 规划规则 + 当前日期；
//! user   = 近期对话 + 用户画像 + 附件摘要 +（重规划时）已有步骤结果与原因 + 用户请求。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::CapabilityRegistry;
use crate::core::OrchestratorError;
use crate::llm::{complete_within, LlmClient};
use crate::memory::Message;
use crate::orchestration::{plan_schema_json, MediaSummary, StepResults, UserProfile};

/// 能力目录段落的标题（MockLlmClient 据此识别规划请求）
pub const CATALOGUE_HEADING: &str = "Capability catalogue";

pub const DEFAULT_PLANNER_PROMPT: &str = "You are the planning component of a personal assistant that talks to users over a messaging channel. \
Break the user's request into the smallest ordered list of steps, each handled by exactly one capability from the catalogue.";

/// 一次规划请求的输入
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task: &'a str,
    pub history: &'a [Message],
    pub media: &'a [MediaSummary],
    pub profile: Option<&'a UserProfile>,
    /// 重规划时已有的步骤结果
    pub prior: Option<&'a StepResults>,
    /// 重规划原因
    pub replan_reason: Option<&'a str>,
}

impl<'a> PlanRequest<'a> {
    pub fn new(task: &'a str) -> Self {
        Self {
            task,
            history: &[],
            media: &[],
            profile: None,
            prior: None,
            replan_reason: None,
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    request_timeout: Duration,
    max_history: usize,
}

impl Planner {
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

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn system_message(&self, registry: &CapabilityRegistry) -> String {
        let today = chrono::Local::now().format("%Y-%m-%d (%A)");
        format!(
            "{base}\n\n## {heading}\n{catalogue}\n## Plan JSON Schema\n{schema}\n\n## Rules\n\
             1) Reply with ONE JSON object matching the schema and nothing else.\n\
             2) `target` must be a capability name from the catalogue and `targetType` must match its kind.\n\
             3) Step ids are unique (step_1, step_2, ...). A later step may refer to an earlier step's result by id, never the reverse.\n\
             4) Steps run one after another; keep the plan as short as possible.\n\
             5) Write each `task` so the capability can act on it without seeing the conversation.\n\n\
             Today is {today}.",
            base = self.system_prompt.trim(),
            heading = CATALOGUE_HEADING,
            catalogue = registry.catalogue(),
            schema = plan_schema_json(),
            today = today,
        )
    }

    fn user_message(&self, req: &PlanRequest<'_>) -> String {
        let mut user = String::new();

        if !req.history.is_empty() {
            user.push_str("Conversation so far:\n");
            let skip = req.history.len().saturating_sub(self.max_history);
            for m in &req.history[skip..] {
                user.push_str(&format!("- {}: {}\n", m.role.as_str(), m.content));
            }
            user.push('\n');
        }

        if let Some(profile) = req.profile {
            if let Ok(json) = serde_json::to_string(profile) {
                user.push_str(&format!("User profile: {}\n\n", json));
            }
        }

        if !req.media.is_empty() {
            user.push_str("Attachments:\n");
            for m in req.media {
                user.push_str(&format!("- [{}] {}\n", m.kind, m.summary));
            }
            user.push('\n');
        }

        if let Some(prior) = req.prior.filter(|p| !p.is_empty()) {
            let used: BTreeSet<&str> = prior.records().iter().map(|r| r.step_id.as_str()).collect();
            user.push_str("Results of steps already executed:\n");
            user.push_str(&prior.to_prompt_json());
            user.push_str("\n\n");
            if let Some(reason) = req.replan_reason {
                user.push_str(&format!("The previous plan was abandoned: {}\n", reason));
            }
            user.push_str(&format!(
                "Plan only the remaining work. Do not reuse these step ids: {}\n\n",
                used.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }

        user.push_str("User request:\n");
        user.push_str(req.task);
        user
    }

    /// 构建完整消息列表（单独暴露便于测试与调试）
    pub fn build_messages(&self, registry: &CapabilityRegistry, req: &PlanRequest<'_>) -> Vec<Message> {
        vec![
            Message::system(self.system_message(registry)),
            Message::user(self.user_message(req)),
        ]
    }

    /// 调用 LLM 生成原始计划文本
    pub async fn plan(
        &self,
        registry: &CapabilityRegistry,
        req: &PlanRequest<'_>,
    ) -> Result<String, OrchestratorError> {
        let messages = self.build_messages(registry, req);
        let raw = complete_within(self.llm.as_ref(), &messages, self.request_timeout).await?;
        tracing::debug!(chars = raw.len(), "planner responded");
        Ok(raw)
    }
}
