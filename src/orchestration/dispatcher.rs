//! Step Dispatcher：解析步骤目标、构建执行上下文、限时调用能力，并把任何结局统一成 StepResult
//!
//! 能力调用在独立的 tokio 任务中运行，外层用 timeout 等待 JoinHandle：
//! - 能力先完成：计时器随 timeout future 一起 drop，使用其结果
//! - 计时器先到：abort 该任务，迟到的结果随任务一起丢弃，不会回到调用方
//! - 能力返回 Err 或 panic：转为失败结果，调度器自身从不报错
//!
//! 每一步输出一条 JSON 审计日志（与 tracing 字段日志并存）。

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tracing::Instrument;

use crate::capabilities::CapabilityRegistry;
use crate::core::OrchestratorError;
use crate::orchestration::{PlanContext, PlanStep, StepFault, StepResult};

pub struct StepDispatcher {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl StepDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 执行一步；永远返回 StepResult
    pub async fn execute_step(&self, step: &PlanStep, ctx: &PlanContext) -> StepResult {
        let start = Instant::now();
        tracing::info!(
            step_id = %step.id,
            target = %step.target,
            target_type = step.target_type.as_str(),
            "step started"
        );

        let Some(capability) = self.registry.resolve(step.target_type, &step.target) else {
            let result = StepResult::failure(
                OrchestratorError::UnknownCapability(step.target.clone()).to_string(),
            )
            .with_fault(StepFault::UnknownCapability);
            self.log_outcome(step, &result, start);
            return result;
        };

        let exec_ctx = ctx.execution_context(&capability.descriptor().tool_allow_list);
        let task = step.task.clone();
        let mut handle = tokio::spawn(
            async move { capability.invoke(&task, exec_ctx).await }.instrument(ctx.span.clone()),
        );

        let result = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => StepResult::failure(
                OrchestratorError::CapabilityFault(format!("{:#}", e)).to_string(),
            )
            .with_fault(StepFault::Capability),
            Ok(Err(join_err)) => StepResult::failure(
                OrchestratorError::CapabilityFault(join_error_message(&step.target, join_err))
                    .to_string(),
            )
            .with_fault(StepFault::Panicked),
            Err(_) => {
                handle.abort();
                StepResult::failure(
                    OrchestratorError::StepTimeout {
                        step_id: step.id.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                    .to_string(),
                )
                .with_fault(StepFault::Timeout)
            }
        };

        self.log_outcome(step, &result, start);
        result
    }

    fn log_outcome(&self, step: &PlanStep, result: &StepResult, start: Instant) {
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match (result.success, result.fault) {
            (true, _) => "ok",
            (false, Some(fault)) => fault.as_str(),
            (false, None) => "error",
        };
        let audit = serde_json::json!({
            "event": "step_audit",
            "step_id": step.id,
            "target": step.target,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit, "step");

        if result.success {
            tracing::info!(step_id = %step.id, target = %step.target, duration_ms, "step completed");
        } else {
            tracing::warn!(
                step_id = %step.id,
                target = %step.target,
                duration_ms,
                timed_out = result.is_timeout(),
                error = result.error.as_deref().unwrap_or(""),
                "step failed"
            );
        }
    }
}

fn join_error_message(target: &str, err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        format!("{} panicked: {}", target, panic_text(payload.as_ref()))
    } else {
        format!("{} was cancelled", target)
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
