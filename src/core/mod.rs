//! 核心编排层：错误类型与主控循环

pub mod error;
pub mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::{
    OrchestrateRequest, OrchestrationResult, Orchestrator, OrchestratorSettings,
};
