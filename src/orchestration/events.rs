//! 编排过程事件：供渠道适配层展示进度（输入中提示、Web SSE 等）

use serde::Serialize;

/// 单次编排中的过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// 计划生成完成（round 为 0 表示首次规划）
    PlanCreated {
        round: usize,
        goal: String,
        steps: usize,
    },
    /// Planner 输出无法解析，改用单步兜底计划
    PlanFallback { round: usize, reason: String },
    StepStarted { step_id: String, target: String },
    StepFinished {
        step_id: String,
        target: String,
        success: bool,
        timed_out: bool,
    },
    /// 触发重规划（attempt 从 1 开始）
    Replanning { after_step: String, attempt: usize },
    /// 重规划次数已用完，继续执行当前计划剩余步骤
    ReplanBudgetExhausted { after_step: String },
    /// 最终回复已生成；fallback 表示未使用 LLM 合成文本
    ReplyComposed { fallback: bool },
}
