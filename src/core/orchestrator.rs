//! 编排器：主控循环
//!
//! orchestrate(request)：
//! 规划 -> 解析（失败则单步兜底计划）-> 逐步调度（每步结果写入 PlanContext）->
//! 每步后评估是否重规划（次数受 max_replans 限制，已有结果保留）-> 合成最终回复。
//!
//! 任何环节的错误都在本层被消化，orchestrate 总是返回 OrchestrationResult。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::capabilities::CapabilityRegistry;
use crate::config::AppConfig;
use crate::core::OrchestratorError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::orchestration::{
    parse_plan, should_replan, ComposeRequest, Composer, MediaSummary, OrchestrationEvent, Plan,
    PlanContext, PlanRequest, Planner, ReplySource, StepDispatcher, StepResult, TargetType,
    UserProfile, DEFAULT_COMPOSER_PROMPT, DEFAULT_PLANNER_PROMPT,
};

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_capability: String,
    pub step_timeout: Duration,
    pub max_replans: usize,
    pub llm_timeout: Duration,
    pub max_history: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            default_capability: cfg.orchestrator.default_capability.clone(),
            step_timeout: cfg.orchestrator.step_timeout(),
            max_replans: cfg.orchestrator.max_replans,
            llm_timeout: cfg.llm.request_timeout(),
            max_history: cfg.orchestrator.max_history_messages,
        }
    }
}

/// 一次编排的输入（由消息处理层构造）
#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    pub task: String,
    pub history: Vec<Message>,
    pub media: Vec<MediaSummary>,
    pub user_profile: Option<UserProfile>,
    pub caller_id: String,
    pub channel: String,
    /// 未提供时生成 uuid
    pub message_id: Option<String>,
    /// 调用方的日志 span；未提供时新建 orchestrate span
    pub span: Option<tracing::Span>,
}

impl OrchestrateRequest {
    pub fn new(
        task: impl Into<String>,
        caller_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            history: Vec::new(),
            media: Vec::new(),
            user_profile: None,
            caller_id: caller_id.into(),
            channel: channel.into(),
            message_id: None,
            span: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_media(mut self, media: Vec<MediaSummary>) -> Self {
        self.media = media;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.user_profile = Some(profile);
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// 编排结果：是否成功与发给用户的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationResult {
    pub success: bool,
    pub response: String,
}

/// 编排器：持有注册表、Planner、Dispatcher、Composer；可被多个会话并发共享（每次调用的状态互不相干）
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    planner: Planner,
    dispatcher: StepDispatcher,
    composer: Composer,
    settings: OrchestratorSettings,
    event_tx: Option<mpsc::UnboundedSender<OrchestrationEvent>>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<CapabilityRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        let planner = Planner::new(llm.clone(), DEFAULT_PLANNER_PROMPT, settings.llm_timeout)
            .with_max_history(settings.max_history);
        let composer = Composer::new(llm, DEFAULT_COMPOSER_PROMPT, settings.llm_timeout)
            .with_max_history(settings.max_history);
        let dispatcher = StepDispatcher::new(registry.clone(), settings.step_timeout);
        Self {
            registry,
            planner,
            dispatcher,
            composer,
            settings,
            event_tx: None,
        }
    }

    /// 替换 Planner（自定义 prompt）
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// 替换 Composer（自定义 prompt）
    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    /// 设置过程事件通道
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<OrchestrationEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn send_event(&self, ev: OrchestrationEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 处理一条用户请求
    pub async fn orchestrate(&self, request: OrchestrateRequest) -> OrchestrationResult {
        let message_id = request
            .message_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = request.span.clone().unwrap_or_else(|| {
            tracing::info_span!(
                "orchestrate",
                caller_id = %request.caller_id,
                channel = %request.channel,
                message_id = %message_id,
            )
        });
        self.run(&request, message_id, span.clone())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: &OrchestrateRequest,
        message_id: String,
        span: tracing::Span,
    ) -> OrchestrationResult {
        let (init_prompt, init_completion, _) = self.planner.token_usage();

        let mut ctx = PlanContext::new(&request.caller_id, &request.channel, message_id, span)
            .with_profile(request.user_profile.clone())
            .with_media(request.media.clone());

        let mut plan = self.make_plan(request, &ctx, None).await;
        let mut replans = 0usize;
        let mut index = 0usize;

        while index < plan.steps.len() {
            let step = plan.steps[index].clone();
            let total = plan.steps.len();

            self.send_event(OrchestrationEvent::StepStarted {
                step_id: step.id.clone(),
                target: step.target.clone(),
            });
            let result = self.dispatcher.execute_step(&step, &ctx).await;
            self.send_event(OrchestrationEvent::StepFinished {
                step_id: step.id.clone(),
                target: step.target.clone(),
                success: result.success,
                timed_out: result.is_timeout(),
            });

            let replan = should_replan(&result, index, total);
            tracing::debug!(step_id = %step.id, step_index = index, total, replan, "replan decision");
            let reason = replan.then(|| replan_reason(&step.id, &result));
            ctx.record(&step.id, &step.target, result);

            if let Some(reason) = reason {
                if replans < self.settings.max_replans {
                    replans += 1;
                    tracing::info!(
                        after_step = %step.id,
                        attempt = replans,
                        max_replans = self.settings.max_replans,
                        reason = %reason,
                        "replanning"
                    );
                    self.send_event(OrchestrationEvent::Replanning {
                        after_step: step.id.clone(),
                        attempt: replans,
                    });
                    ctx.begin_replan();
                    plan = self.make_plan(request, &ctx, Some(&reason)).await;
                    index = 0;
                    continue;
                }
                tracing::warn!(
                    after_step = %step.id,
                    max_replans = self.settings.max_replans,
                    "replan budget exhausted, continuing current plan"
                );
                self.send_event(OrchestrationEvent::ReplanBudgetExhausted {
                    after_step: step.id.clone(),
                });
            }

            index += 1;
        }

        let reply = self
            .composer
            .compose(&ComposeRequest {
                task: &request.task,
                history: &request.history,
                goal: Some(&plan.goal),
                results: ctx.step_results(),
            })
            .await;
        self.send_event(OrchestrationEvent::ReplyComposed {
            fallback: reply.is_fallback(),
        });

        let success = reply.source != ReplySource::Generic && ctx.step_results().any_success();
        let (cur_prompt, cur_completion, _) = self.planner.token_usage();
        tracing::info!(
            success,
            steps = ctx.step_results().len(),
            replans,
            reply_source = ?reply.source,
            prompt_tokens = cur_prompt.saturating_sub(init_prompt),
            completion_tokens = cur_completion.saturating_sub(init_completion),
            "orchestration finished"
        );

        OrchestrationResult {
            success,
            response: reply.text,
        }
    }

    /// 规划并解析；LLM 出错或输出不合 schema 时返回单步兜底计划
    async fn make_plan(
        &self,
        request: &OrchestrateRequest,
        ctx: &PlanContext,
        replan_reason: Option<&str>,
    ) -> Plan {
        let round = ctx.plan_round();
        let plan_request = PlanRequest {
            task: &request.task,
            history: &request.history,
            media: &request.media,
            profile: request.user_profile.as_ref(),
            prior: replan_reason.map(|_| ctx.step_results()),
            replan_reason,
        };

        let parsed = match self.planner.plan(&self.registry, &plan_request).await {
            Ok(raw) => parse_plan(&raw).map_err(|e| OrchestratorError::PlanFormat(e.to_string())),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(plan) => {
                tracing::info!(
                    round,
                    goal = %plan.goal,
                    steps = plan.steps.len(),
                    targets = %plan.steps.iter().map(|s| s.target.as_str()).collect::<Vec<_>>().join(","),
                    "plan created"
                );
                self.send_event(OrchestrationEvent::PlanCreated {
                    round,
                    goal: plan.goal.clone(),
                    steps: plan.steps.len(),
                });
                plan
            }
            Err(e) => {
                tracing::warn!(
                    round,
                    error_kind = e.kind(),
                    error = %e,
                    fallback = %self.settings.default_capability,
                    "planning failed, using single-step fallback plan"
                );
                self.send_event(OrchestrationEvent::PlanFallback {
                    round,
                    reason: e.to_string(),
                });
                let name = &self.settings.default_capability;
                let kind = self.registry.kind_of(name).unwrap_or(TargetType::Agent);
                Plan::fallback(&request.task, name, kind)
            }
        }
    }
}

fn replan_reason(step_id: &str, result: &StepResult) -> String {
    if result.needs_replan() {
        format!("step {} asked for a new plan", step_id)
    } else if result.is_empty_signal() {
        format!("step {} returned no data", step_id)
    } else {
        format!(
            "step {} failed: {}",
            step_id,
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::EchoSkill;
    use crate::llm::ScriptedLlmClient;

    fn orchestrator(llm: Arc<ScriptedLlmClient>, max_replans: usize) -> Orchestrator {
        let mut reg = CapabilityRegistry::new();
        reg.register(EchoSkill::new());
        let settings = OrchestratorSettings {
            default_capability: "echo".to_string(),
            max_replans,
            ..OrchestratorSettings::default()
        };
        Orchestrator::new(llm, Arc::new(reg), settings)
    }

    #[test]
    fn test_replan_reason_text() {
        let r = StepResult::failure("Unknown capability: x");
        assert_eq!(replan_reason("s1", &r), "step s1 failed: Unknown capability: x");
        let r = StepResult::ok(serde_json::json!({"needsReplan": true}));
        assert_eq!(replan_reason("s1", &r), "step s1 asked for a new plan");
    }

    #[tokio::test]
    async fn test_fallback_to_skill_default() {
        // 兜底能力是 skill 时，兜底计划也按 skill 解析
        let llm = Arc::new(ScriptedLlmClient::new([
            "I cannot process this request properly",
            "ok",
        ]));
        let orch = orchestrator(llm.clone(), 2);

        let result = orch
            .orchestrate(OrchestrateRequest::new("ping", "u", "console"))
            .await;
        assert!(result.success);
        assert_eq!(result.response, "ok");

        let composer_input: String = llm.calls()[1].iter().map(|m| m.content.clone()).collect();
        assert!(!composer_input.contains("Unknown capability"));
        assert!(composer_input.contains("\"ping\""));
    }

    #[tokio::test]
    async fn test_replans_are_bounded() {
        // 每次规划都产生一个首步永远失败的两步计划；只允许 1 次重规划
        let bad_plan = r#"{"goal": "g", "steps": [
            {"id": "a", "targetType": "agent", "target": "ghost-agent", "task": "t"},
            {"id": "b", "targetType": "skill", "target": "echo", "task": "still here"}]}"#;
        let llm = Arc::new(
            ScriptedLlmClient::new([bad_plan, bad_plan]).then_reply("Done partially."),
        );
        let orch = orchestrator(llm.clone(), 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = orch.with_events(tx);

        let result = orch
            .orchestrate(OrchestrateRequest::new("t", "u", "console"))
            .await;
        assert!(result.success);
        assert_eq!(result.response, "Done partially.");
        // 2 次规划 + 1 次合成
        assert_eq!(llm.call_count(), 3);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        let replanning = events
            .iter()
            .filter(|e| matches!(e, OrchestrationEvent::Replanning { .. }))
            .count();
        assert_eq!(replanning, 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, OrchestrationEvent::ReplanBudgetExhausted { .. })));
        assert!(matches!(
            events.last(),
            Some(OrchestrationEvent::ReplyComposed { fallback: false })
        ));
    }

    #[tokio::test]
    async fn test_total_failure_is_generic_reply() {
        // 规划与合成的 LLM 调用全部失败；兜底能力也不存在
        let llm = Arc::new(ScriptedLlmClient::default());
        let mut reg = CapabilityRegistry::new();
        reg.register(EchoSkill::new());
        let orch = Orchestrator::new(llm, Arc::new(reg), OrchestratorSettings::default());
        let result = orch
            .orchestrate(OrchestrateRequest::new("anything", "u", "console"))
            .await;
        assert!(!result.success);
        assert_eq!(result.response, crate::orchestration::GENERIC_FAILURE_REPLY);
    }
}
