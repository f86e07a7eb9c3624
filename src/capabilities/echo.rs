//! Echo 技能（诊断用）：原样返回任务文本

use async_trait::async_trait;

use crate::capabilities::{Capability, CapabilityDescriptor};
use crate::orchestration::{ExecutionContext, StepResult, TargetType};

pub struct EchoSkill {
    descriptor: CapabilityDescriptor,
}

impl EchoSkill {
    pub fn new() -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                "echo",
                TargetType::Skill,
                "Returns the task text unchanged (diagnostics only).",
            )
            .with_examples(["Echo 'hello'"]),
        }
    }
}

impl Default for EchoSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for EchoSkill {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, task: &str, _ctx: ExecutionContext) -> anyhow::Result<StepResult> {
        if task.trim().is_empty() {
            return Ok(StepResult::ok(serde_json::json!({ "isEmpty": true })));
        }
        Ok(StepResult::ok(task.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::PlanContext;

    #[tokio::test]
    async fn test_echo_returns_task() {
        let ctx = PlanContext::new("u", "console", "m", tracing::Span::none());
        let res = EchoSkill::new()
            .invoke("hello", ctx.execution_context(&[]))
            .await
            .unwrap();
        assert!(res.success);
        assert_eq!(res.output, serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn test_echo_flags_empty_task() {
        let ctx = PlanContext::new("u", "console", "m", tracing::Span::none());
        let res = EchoSkill::new()
            .invoke("  ", ctx.execution_context(&[]))
            .await
            .unwrap();
        assert!(res.is_empty_signal());
    }
}
