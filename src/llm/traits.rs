//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmClient::complete（非流式）。
//! Planner 与 Composer 只依赖该 trait，不关心具体后端。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 在 limit 内完成一次 LLM 调用；超时转为 LlmError::Timeout（底层请求 future 随之被 drop）
pub async fn complete_within(
    llm: &dyn LlmClient,
    messages: &[Message],
    limit: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(limit, llm.complete(messages)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverLlm;

    #[async_trait]
    impl LlmClient for NeverLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_complete_within_times_out() {
        let err = complete_within(&NeverLlm, &[], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }

    #[test]
    fn test_default_token_usage() {
        assert_eq!(NeverLlm.token_usage(), (0, 0, 0));
    }
}
