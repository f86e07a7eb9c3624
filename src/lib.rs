//! Switchboard - 多能力助手的编排核心
//!
//! 把一条用户消息变成：LLM 生成的多步计划 -> 逐步限时调用能力 -> 必要时重规划 -> 合成一条回复。
//!
//! 模块划分：
//! - **agent**: Headless 装配（LLM 选择、内置能力、构建 Orchestrator）
//! - **capabilities**: Capability trait、注册表与内置能力
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与主控循环（orchestrate）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）
//! - **memory**: 对话消息与短期历史
//! - **observability**: tracing 初始化
//! - **orchestration**: Planner、Plan Parser、Step Dispatcher、Replan Evaluator、Composer

pub mod agent;
pub mod capabilities;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod orchestration;

pub use crate::core::{OrchestrateRequest, OrchestrationResult, Orchestrator, OrchestratorSettings};
