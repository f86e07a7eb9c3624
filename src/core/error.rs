//! 编排错误类型
//!
//! 这些错误都不会越过 orchestrate() 的边界：每一种都在本地被降级为兜底计划、单步失败或兜底回复，
//! 这里的类型只用于日志诊断与内部传递。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Planner 输出不符合计划 schema（降级为单步兜底计划）
    #[error("Plan format error: {0}")]
    PlanFormat(String),

    /// 步骤目标未注册（该步失败，继续后续步骤）
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// 步骤超时（该步失败，与普通失败区分记录）
    #[error("Step {step_id} timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    /// 能力调用返回错误或 panic
    #[error("Capability fault: {0}")]
    CapabilityFault(String),

    /// 合成回复没有可用文本（走链接兜底或通用致歉）
    #[error("Composer produced no usable text")]
    ComposerEmpty,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// 结构化日志里的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::PlanFormat(_) => "plan_format",
            OrchestratorError::UnknownCapability(_) => "unknown_capability",
            OrchestratorError::StepTimeout { .. } => "step_timeout",
            OrchestratorError::CapabilityFault(_) => "capability_fault",
            OrchestratorError::ComposerEmpty => "composer_empty",
            OrchestratorError::Llm(_) => "llm",
            OrchestratorError::Config(_) => "config",
        }
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(e: config::ConfigError) -> Self {
        OrchestratorError::Config(e.to_string())
    }
}
