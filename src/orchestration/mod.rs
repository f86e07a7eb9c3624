//! 编排组件：计划模型与解析、Planner、Step Dispatcher、Replan Evaluator、Composer、运行期上下文与事件
//!
//! 主控循环在 core::orchestrator 中把这些组件串起来。

pub mod composer;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod parser;
pub mod plan;
pub mod planner;
pub mod replan;

pub use composer::{
    fallback_reply, find_generated_link, first_text_segment, ComposeRequest, ComposedReply,
    Composer, ReplySource, DEFAULT_COMPOSER_PROMPT, GENERIC_FAILURE_REPLY,
};
pub use context::{
    ExecutionContext, MediaSummary, PlanContext, StepFault, StepRecord, StepResult, StepResults,
    ToolCallRecord, UserProfile, SIGNAL_IS_EMPTY, SIGNAL_NEEDS_REPLAN,
};
pub use dispatcher::StepDispatcher;
pub use events::OrchestrationEvent;
pub use parser::{extract_json, parse_plan, PlanParseError};
pub use plan::{plan_schema_json, Plan, PlanStep, TargetType};
pub use planner::{PlanRequest, Planner, DEFAULT_PLANNER_PROMPT};
pub use replan::should_replan;
