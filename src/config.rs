//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWITCHBOARD__*` 覆盖
//! （双下划线表示嵌套，如 `SWITCHBOARD__ORCHESTRATOR__MAX_REPLANS=1`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::capabilities::GENERAL_AGENT;
use crate::core::OrchestratorError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；实际选择还取决于环境中有哪个 API Key
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmModelSection,
    pub openai: LlmModelSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次规划/合成 LLM 请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [orchestrator] 段：兜底能力、单步超时、重规划上限、历史长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 计划解析失败时整体接手任务的能力名
    pub default_capability: String,
    /// 单步能力调用超时（秒）
    pub step_timeout_secs: u64,
    /// 单次编排允许的最大重规划次数
    pub max_replans: usize,
    /// 拼入 planner / composer prompt 的最近消息条数
    pub max_history_messages: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            default_capability: GENERAL_AGENT.to_string(),
            step_timeout_secs: 30,
            max_replans: 2,
            max_history_messages: 20,
        }
    }
}

impl OrchestratorSection {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request)
    }
}

/// 从 config 目录加载配置，环境变量 SWITCHBOARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWITCHBOARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, OrchestratorError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    if let Some(name) = default_names
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{}.toml", name)).exists())
    {
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWITCHBOARD")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.default_capability, "general-agent");
        assert_eq!(cfg.orchestrator.step_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.orchestrator.max_replans, 2);
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[orchestrator]\ndefault_capability = \"assistant-agent\"\nstep_timeout_secs = 5\nmax_replans = 0\n\n[llm.timeouts]\nrequest = 9"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.orchestrator.default_capability, "assistant-agent");
        assert_eq!(cfg.orchestrator.step_timeout_secs, 5);
        assert_eq!(cfg.orchestrator.max_replans, 0);
        assert_eq!(cfg.llm.timeouts.request, 9);
        // 未给出的键保持默认
        assert_eq!(cfg.orchestrator.max_history_messages, 20);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[orchestrator\nmax_replans = ").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
        assert_eq!(err.kind(), "config");
    }
}
