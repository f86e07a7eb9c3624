//! Plan Parser：从 Planner 原始输出中提取并校验计划
//!
//! 输出可能带 ```json 代码块或前后夹杂说明文字。先找出 JSON 对象，再按 Plan 的 schema 严格反序列化，
//! 最后校验步骤（非空、字段非空、id 唯一）。任何一步失败都返回 PlanParseError，不做部分修补，
//! 由编排器换成单步兜底计划。解析是纯函数，同一输入总得到相同结果。

use std::collections::HashSet;

use thiserror::Error;

use crate::orchestration::Plan;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("no JSON object found in planner output")]
    NoJson,

    #[error("invalid plan JSON: {0}")]
    InvalidJson(String),

    #[error("plan has no steps")]
    EmptySteps,

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step {index} has an empty `{field}`")]
    MissingField { index: usize, field: &'static str },
}

/// 一次线性扫描找出所有配平的 {...}，按起始位置排序（跳过字符串内的括号与转义）
///
/// 未闭合的 '{' 不产生候选；多余的 '}' 忽略。
fn object_spans(s: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            // 对象外的引号属于说明文字
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// 第一个能解析为 JSON 对象的候选
fn first_object(s: &str) -> Option<&str> {
    object_spans(s)
        .into_iter()
        .map(|(start, end)| &s[start..end])
        .find(|candidate| {
            serde_json::from_str::<serde_json::Value>(candidate)
                .map(|v| v.is_object())
                .unwrap_or(false)
        })
}

/// 提取候选 JSON 对象：优先 ```json 代码块内的对象，否则取全文中第一个能解析为对象的 {...}
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        if let Some(obj) = first_object(body) {
            return Some(obj);
        }
    }

    first_object(trimmed)
}

/// 解析并校验计划
pub fn parse_plan(raw: &str) -> Result<Plan, PlanParseError> {
    let json = extract_json(raw).ok_or(PlanParseError::NoJson)?;
    let mut plan: Plan =
        serde_json::from_str(json).map_err(|e| PlanParseError::InvalidJson(e.to_string()))?;

    if plan.steps.is_empty() {
        return Err(PlanParseError::EmptySteps);
    }

    plan.analysis = plan.analysis.trim().to_string();
    plan.goal = plan.goal.trim().to_string();

    let mut seen = HashSet::new();
    for (index, step) in plan.steps.iter_mut().enumerate() {
        step.id = step.id.trim().to_string();
        step.target = step.target.trim().to_string();
        step.task = step.task.trim().to_string();

        if step.id.is_empty() {
            return Err(PlanParseError::MissingField { index, field: "id" });
        }
        if step.target.is_empty() {
            return Err(PlanParseError::MissingField { index, field: "target" });
        }
        if step.task.is_empty() {
            return Err(PlanParseError::MissingField { index, field: "task" });
        }
        if !seen.insert(step.id.clone()) {
            return Err(PlanParseError::DuplicateStepId(step.id.clone()));
        }
    }

    Ok(plan)
}
