//! Headless 装配
//!
//! 供渠道适配层（WhatsApp、飞书、HTTP 等）与命令行入口使用：
//! create_llm_from_config 选择 LLM 后端，default_registry 注册内置能力，
//! create_orchestrator 用配置与注册表构建 Orchestrator。

use std::sync::Arc;

use crate::capabilities::{CapabilityRegistry, EchoSkill, GeneralAgent};
use crate::config::AppConfig;
use crate::core::{Orchestrator, OrchestratorSettings};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::orchestration::{
    Composer, Planner, DEFAULT_COMPOSER_PROMPT, DEFAULT_PLANNER_PROMPT,
};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key，或配置为 deepseek 且只有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 内置能力：通用智能体（以 default_capability 命名，作为计划兜底目标）与 Echo 技能
pub fn default_registry(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(GeneralAgent::named(
        &cfg.orchestrator.default_capability,
        llm,
        cfg.llm.request_timeout(),
    ));
    registry.register(EchoSkill::new());
    registry
}

/// 读取 config/prompts/<name>.txt，不存在时用内置默认
pub fn load_prompt(name: &str, default: &str) -> String {
    [
        format!("config/prompts/{}.txt", name),
        format!("../config/prompts/{}.txt", name),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .filter(|s| !s.trim().is_empty())
    .unwrap_or_else(|| default.to_string())
}

/// 构建 Orchestrator；注册表缺少兜底能力时只告警（解析失败的请求会得到 Unknown capability）
pub fn create_orchestrator(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    registry: CapabilityRegistry,
) -> Orchestrator {
    let settings = OrchestratorSettings::from_config(cfg);
    // 兜底计划按注册时的类型构造，只要名称存在就能解析
    match registry.kind_of(&settings.default_capability) {
        Some(kind) => tracing::debug!(
            default_capability = %settings.default_capability,
            kind = kind.as_str(),
            "fallback capability resolved"
        ),
        None => tracing::warn!(
            default_capability = %settings.default_capability,
            registered = ?registry.names(),
            "default capability is not registered"
        ),
    }

    let planner = Planner::new(
        llm.clone(),
        load_prompt("planner", DEFAULT_PLANNER_PROMPT),
        settings.llm_timeout,
    )
    .with_max_history(settings.max_history);
    let composer = Composer::new(
        llm.clone(),
        load_prompt("composer", DEFAULT_COMPOSER_PROMPT),
        settings.llm_timeout,
    )
    .with_max_history(settings.max_history);

    Orchestrator::new(llm, Arc::new(registry), settings)
        .with_planner(planner)
        .with_composer(composer)
}
