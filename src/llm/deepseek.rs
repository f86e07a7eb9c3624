//! DeepSeek 预设（OpenAI 兼容端点）
//!
//! - Base URL: https://api.deepseek.com
//! - 规划/合成默认用 deepseek-chat；deepseek-reasoner 响应慢，容易吃满 LLM 超时

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// Key 优先取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`；
/// 模型取参数，其次 `DEEPSEEK_MODEL`，最后 deepseek-chat。
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key.as_str()))
}
