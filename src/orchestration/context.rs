//! 运行期上下文：StepResult、步骤结果累积、PlanContext 与能力可见的 ExecutionContext
//!
//! PlanContext 归单次 orchestrate() 独占，只在每步结束后追加结果；
//! ExecutionContext 是交给能力的只读视图，prior_results 为 Arc 快照，能力无法改写编排状态。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 结果中可被编排器读取的信号字段
pub const SIGNAL_NEEDS_REPLAN: &str = "needsReplan";
pub const SIGNAL_IS_EMPTY: &str = "isEmpty";

/// 能力内部的一次工具调用记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
}

/// 调度器给失败结果打的诊断标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFault {
    UnknownCapability,
    Timeout,
    Capability,
    Panicked,
}

impl StepFault {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepFault::UnknownCapability => "unknown",
            StepFault::Timeout => "timeout",
            StepFault::Capability => "error",
            StepFault::Panicked => "panic",
        }
    }
}

/// 单步执行的统一结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// 仅由调度器设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<StepFault>,
}

impl StepResult {
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            tool_calls: Vec::new(),
            fault: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            tool_calls: Vec::new(),
            fault: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<Value>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub(crate) fn with_fault(mut self, fault: StepFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// 读取 output 对象上的布尔信号；output 不是对象或字段不是 true 时为 false
    pub fn signal(&self, name: &str) -> bool {
        self.output
            .as_object()
            .and_then(|o| o.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn needs_replan(&self) -> bool {
        self.signal(SIGNAL_NEEDS_REPLAN)
    }

    pub fn is_empty_signal(&self) -> bool {
        self.signal(SIGNAL_IS_EMPTY)
    }

    pub fn is_timeout(&self) -> bool {
        self.fault == Some(StepFault::Timeout)
    }
}

/// 一条已完成步骤的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step_id: String,
    pub target: String,
    /// 产生该结果的计划轮次（0 为首次规划，每次重规划 +1）
    pub plan_round: usize,
    pub result: StepResult,
}

/// 按完成顺序累积的步骤结果；同 id 的后续结果不覆盖之前的记录，按 id 查询取最新一条
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepResults {
    records: Vec<StepRecord>,
}

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    /// 按步骤 id 取最新结果
    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.records
            .iter()
            .rev()
            .find(|r| r.step_id == step_id)
            .map(|r| &r.result)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.get(step_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn any_success(&self) -> bool {
        self.records.iter().any(|r| r.result.success)
    }

    /// 未被重规划挽回的失败：只看最后一个计划轮次
    pub fn unresolved_failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.latest_batch().iter().filter(|r| !r.result.success)
    }

    /// 最近一批结果：最后一个计划轮次产生的全部记录（按完成顺序）
    pub fn latest_batch(&self) -> &[StepRecord] {
        let Some(last) = self.records.last() else {
            return &[];
        };
        let start = self
            .records
            .iter()
            .rposition(|r| r.plan_round != last.plan_round)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.records[start..]
    }

    /// 拼入 prompt 的 JSON 表示：[{stepId, target, success, output, error}]
    pub fn to_prompt_json(&self) -> String {
        let items: Vec<Value> = self
            .records
            .iter()
            .map(|r| {
                let mut item = Map::new();
                item.insert("stepId".into(), Value::String(r.step_id.clone()));
                item.insert("target".into(), Value::String(r.target.clone()));
                item.insert("success".into(), Value::Bool(r.result.success));
                item.insert("output".into(), r.result.output.clone());
                if let Some(err) = &r.result.error {
                    item.insert("error".into(), Value::String(err.clone()));
                }
                Value::Object(item)
            })
            .collect();
        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 用户画像（由外部持久层提供，编排器只读）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 附件/媒体摘要（图片描述、语音转写等，由上游生成）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub kind: String,
    pub summary: String,
}

/// 单次编排的可变上下文
#[derive(Debug)]
pub struct PlanContext {
    pub caller_id: String,
    pub channel: String,
    pub user_profile: Option<UserProfile>,
    pub media: Vec<MediaSummary>,
    pub message_id: String,
    pub span: tracing::Span,
    step_results: Arc<StepResults>,
    plan_round: usize,
}

impl PlanContext {
    pub fn new(
        caller_id: impl Into<String>,
        channel: impl Into<String>,
        message_id: impl Into<String>,
        span: tracing::Span,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            channel: channel.into(),
            user_profile: None,
            media: Vec::new(),
            message_id: message_id.into(),
            span,
            step_results: Arc::new(StepResults::new()),
            plan_round: 0,
        }
    }

    pub fn with_profile(mut self, profile: Option<UserProfile>) -> Self {
        self.user_profile = profile;
        self
    }

    pub fn with_media(mut self, media: Vec<MediaSummary>) -> Self {
        self.media = media;
        self
    }

    pub fn step_results(&self) -> &StepResults {
        &self.step_results
    }

    pub fn plan_round(&self) -> usize {
        self.plan_round
    }

    /// 进入下一计划轮次（重规划时调用；已累积的结果保留）
    pub fn begin_replan(&mut self) {
        self.plan_round += 1;
    }

    /// 追加一步结果；若仍有超时步骤的快照存活，make_mut 会复制一份，不影响其只读视图
    pub fn record(&mut self, step_id: &str, target: &str, result: StepResult) {
        let plan_round = self.plan_round;
        Arc::make_mut(&mut self.step_results).push(StepRecord {
            step_id: step_id.to_string(),
            target: target.to_string(),
            plan_round,
            result,
        });
    }

    /// 为某个能力构建只读执行上下文
    pub fn execution_context(&self, allowed_tools: &[String]) -> ExecutionContext {
        ExecutionContext {
            caller_id: self.caller_id.clone(),
            channel: self.channel.clone(),
            user_profile: self.user_profile.clone(),
            prior_results: Arc::clone(&self.step_results),
            media: self.media.clone(),
            message_id: self.message_id.clone(),
            allowed_tools: allowed_tools.to_vec(),
            span: self.span.clone(),
        }
    }
}

/// 能力调用时看到的上下文
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub caller_id: String,
    pub channel: String,
    pub user_profile: Option<UserProfile>,
    pub prior_results: Arc<StepResults>,
    pub media: Vec<MediaSummary>,
    pub message_id: String,
    /// 该能力描述符中声明的工具白名单
    pub allowed_tools: Vec<String>,
    pub span: tracing::Span,
}

impl ExecutionContext {
    pub fn prior(&self, step_id: &str) -> Option<&StepResult> {
        self.prior_results.get(step_id)
    }
}
