//! 计划数据模型：Plan / PlanStep / TargetType
//!
//! 同时用于 serde 反序列化 Planner 输出与 schemars 生成注入 prompt 的 JSON Schema，
//! 保证「告诉 LLM 的格式」与「实际解析的格式」是同一份定义。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 步骤目标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// 多轮、自带工具循环的智能体
    Agent,
    /// 单一用途的技能
    Skill,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Agent => "agent",
            TargetType::Skill => "skill",
        }
    }
}

/// 计划中的一步：交给一个能力执行的一段任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// 计划内唯一的步骤 id，如 step_1
    pub id: String,
    /// agent 或 skill
    pub target_type: TargetType,
    /// 能力名，必须取自能力目录
    pub target: String,
    /// 交给该能力的自然语言任务；可按 id 引用之前步骤的结果
    pub task: String,
}

/// 一次规划的结果：分析、目标与有序步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// 对用户请求的简要分析
    #[serde(default)]
    pub analysis: String,
    /// 本次计划要达成的目标
    pub goal: String,
    /// 按执行顺序排列的步骤（至少一步）
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// 单步兜底计划：把原始任务整体交给默认能力（kind 取该能力注册时的类型）
    pub fn fallback(task: &str, default_capability: &str, kind: TargetType) -> Self {
        Self {
            analysis: "Planner output was unusable; delegating the whole request.".to_string(),
            goal: task.to_string(),
            steps: vec![PlanStep {
                id: "step_1".to_string(),
                target_type: kind,
                target: default_capability.to_string(),
                task: task.to_string(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 计划的 JSON Schema（拼入 planner system prompt）
pub fn plan_schema_json() -> String {
    let schema = schemars::schema_for!(Plan);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
