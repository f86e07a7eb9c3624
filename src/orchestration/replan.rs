//! Replan Evaluator：根据单步结果与所处位置决定是否重规划
//!
//! 纯函数，无副作用；优先级：needsReplan 信号 > 中途空结果 > 中途失败。
//! 最后一步失败不触发重规划，而是作为部分失败交给 Composer。

use crate::orchestration::StepResult;

pub fn should_replan(result: &StepResult, step_index: usize, total_steps: usize) -> bool {
    if result.needs_replan() {
        return true;
    }
    let has_remaining = step_index + 1 < total_steps;
    if result.is_empty_signal() && has_remaining {
        return true;
    }
    !result.success && has_remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_mid_plan_replans() {
        assert!(should_replan(&StepResult::failure("x"), 0, 2));
    }

    #[test]
    fn test_failure_on_last_step_does_not() {
        assert!(!should_replan(&StepResult::failure("x"), 1, 2));
        assert!(!should_replan(&StepResult::failure("x"), 0, 1));
    }

    #[test]
    fn test_needs_replan_wins_everywhere() {
        let r = StepResult::ok(json!({"needsReplan": true}));
        assert!(should_replan(&r, 1, 2));
        let r = StepResult::failure("x").with_output(json!({"needsReplan": true}));
        assert!(should_replan(&r, 0, 1));
    }

    #[test]
    fn test_empty_result_only_mid_plan() {
        let r = StepResult::ok(json!({"isEmpty": true}));
        assert!(should_replan(&r, 0, 3));
        assert!(should_replan(&r, 1, 3));
        assert!(!should_replan(&r, 2, 3));
    }

    #[test]
    fn test_success_never_replans() {
        let r = StepResult::ok(json!({"items": []}));
        assert!(!should_replan(&r, 0, 3));
        assert!(!should_replan(&StepResult::ok("done"), 0, 2));
    }

    #[test]
    fn test_repeatable() {
        let r = StepResult::failure("x");
        let first = should_replan(&r, 0, 2);
        assert_eq!(first, should_replan(&r, 0, 2));
    }
}
