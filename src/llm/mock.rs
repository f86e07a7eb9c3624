//! 测试与本地运行用的 LLM 客户端（无需 API）
//!
//! - MockLlmClient：无 Key 时的兜底后端。规划请求回一个把用户请求交给 general-agent 的单步计划，
//!   其余请求回显最后一条 User 消息的最后一行
//! - ScriptedLlmClient：按顺序返回预置回复，并记录每次收到的消息，供测试断言 prompt 内容

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::capabilities::GENERAL_AGENT;
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::orchestration::planner::CATALOGUE_HEADING;

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let is_planning = messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains(CATALOGUE_HEADING));
        let input = last_user(messages);

        if is_planning {
            let task = input.rsplit("User request:\n").next().unwrap_or(input);
            let plan = serde_json::json!({
                "analysis": "Mock planner: delegate everything to the general agent.",
                "goal": "Answer the user",
                "steps": [{
                    "id": "step_1",
                    "targetType": "agent",
                    "target": GENERAL_AGENT,
                    "task": task,
                }]
            });
            return Ok(plan.to_string());
        }

        let last_line = input.lines().last().unwrap_or(input);
        Ok(format!("Echo from Mock: {}", last_line))
    }
}

/// 按顺序返回预置回复；队列耗尽后返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一条错误回复
    pub fn then_error(self, err: LlmError) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Err(err));
        self
    }

    /// 追加一条正常回复
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Ok(reply.into()));
        self
    }

    /// 已收到的全部请求（每次调用一组消息）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_plans_when_catalogue_present() {
        let messages = vec![
            Message::system(format!("## {}\n- general-agent", CATALOGUE_HEADING)),
            Message::user("Conversation so far:\n- user: hi\n\nUser request:\nbook a table"),
        ];
        let out = MockLlmClient.complete(&messages).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["steps"][0]["target"], "general-agent");
        assert_eq!(v["steps"][0]["task"], "book a table");
    }

    #[tokio::test]
    async fn test_mock_echoes_otherwise() {
        let out = MockLlmClient
            .complete(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: hi");
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order_and_records() {
        let llm = ScriptedLlmClient::new(["first"]).then_error(LlmError::Timeout(5));
        assert_eq!(llm.complete(&[Message::user("a")]).await.unwrap(), "first");
        assert_eq!(
            llm.complete(&[Message::user("b")]).await,
            Err(LlmError::Timeout(5))
        );
        assert_eq!(
            llm.complete(&[Message::user("c")]).await,
            Err(LlmError::EmptyResponse)
        );
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[1][0].content, "b");
    }
}
