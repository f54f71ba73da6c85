//! Scripted Completion Client - 用于测试的补全客户端
//!
//! 按调用序号返回预设的响应，不实际调用 LLM 服务，并记录收到的每个请求

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{CompletionPort, PromptSpec, ServiceError};

/// 根据请求和调用序号（从 0 开始）生成响应
pub type Responder = Box<dyn Fn(&PromptSpec, usize) -> Result<String, ServiceError> + Send + Sync>;

/// Scripted Completion Client
pub struct ScriptedCompletionClient {
    responder: Responder,
    calls: Mutex<Vec<PromptSpec>>,
    /// 模拟服务延迟
    delay: Option<Duration>,
}

impl ScriptedCompletionClient {
    /// 使用自定义响应函数创建
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&PromptSpec, usize) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// 按顺序返回给定响应，用完后返回永久错误
    pub fn from_responses(responses: Vec<Result<String, ServiceError>>) -> Self {
        Self::with_responder(move |_, index| {
            responses.get(index).cloned().unwrap_or_else(|| {
                Err(ServiceError::permanent(format!(
                    "no scripted response for call {}",
                    index
                )))
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<PromptSpec>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 已收到的请求（按调用顺序）
    pub fn calls(&self) -> Vec<PromptSpec> {
        self.lock_calls().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }
}

#[async_trait]
impl CompletionPort for ScriptedCompletionClient {
    async fn complete(&self, spec: &PromptSpec) -> Result<String, ServiceError> {
        let index = {
            let mut calls = self.lock_calls();
            calls.push(spec.clone());
            calls.len() - 1
        };

        tracing::debug!(
            call = index,
            kind = %spec.kind,
            max_tokens = spec.max_tokens,
            "ScriptedCompletionClient: returning scripted response"
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(spec, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PromptKind;

    fn spec() -> PromptSpec {
        PromptSpec {
            kind: PromptKind::Story,
            system: "s".to_string(),
            user: "u".to_string(),
            max_tokens: 10,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn test_from_responses_in_order() {
        let client = ScriptedCompletionClient::from_responses(vec![
            Ok("first".to_string()),
            Err(ServiceError::transient("busy")),
        ]);
        assert_eq!(client.complete(&spec()).await, Ok("first".to_string()));
        assert_eq!(
            client.complete(&spec()).await,
            Err(ServiceError::transient("busy"))
        );
        assert!(matches!(
            client.complete(&spec()).await,
            Err(ServiceError::Permanent(_))
        ));
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.calls()[0], spec());
    }

    #[tokio::test]
    async fn test_responder_sees_spec() {
        let client = ScriptedCompletionClient::with_responder(|spec, index| {
            Ok(format!("{}:{}", spec.kind, index))
        });
        assert_eq!(client.complete(&spec()).await, Ok("story:0".to_string()));
        assert!(client.health_check().await);
    }
}
