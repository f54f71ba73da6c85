//! HTTP Completion Client - 调用 OpenAI 兼容的 Chat Completions 服务
//!
//! 实现 CompletionPort trait
//!
//! 外部 API:
//! POST {base_url}/chat/completions
//! Authorization: Bearer {api_key}
//! Request: {"model": "...", "messages": [...], "max_tokens": N, "temperature": T}
//! Response: {"choices": [{"message": {"content": "..."}}]}

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::application::ports::{CompletionPort, PromptSpec, ServiceError};

pub const DEFAULT_BASE_URL: &str = "https://api.studio.nebius.com/v1";
pub const DEFAULT_MODEL: &str = "microsoft/phi-4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP 补全客户端配置
#[derive(Clone)]
pub struct HttpCompletionClientConfig {
    /// 服务基础 URL（不含 /chat/completions）
    pub base_url: String,
    pub model: String,
    /// API 密钥，只通过配置传入
    pub api_key: Option<String>,
    /// 单次调用超时（秒）
    pub timeout_secs: u64,
}

impl std::fmt::Debug for HttpCompletionClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionClientConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for HttpCompletionClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpCompletionClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// 按 HTTP 状态码区分暂时性与永久错误
///
/// 408 / 409 / 425 / 429 与 5xx 可重试；其余 4xx（凭证、请求格式、模型不存在）不可重试
pub fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    let code = status.as_u16();
    if status.is_server_error() || matches!(code, 408 | 409 | 425 | 429) {
        ServiceError::Transient(message)
    } else {
        ServiceError::Permanent(message)
    }
}

/// 网络层错误分类：超时与连接错误可重试
fn classify_transport(err: &reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::transient(format!("Request timeout: {}", err))
    } else if err.is_connect() {
        ServiceError::transient(format!("Cannot connect to completion service: {}", err))
    } else if err.is_builder() {
        ServiceError::permanent(format!("Malformed request: {}", err))
    } else {
        ServiceError::transient(err.to_string())
    }
}

/// HTTP 补全客户端
pub struct HttpCompletionClient {
    client: Client,
    config: HttpCompletionClientConfig,
    api_key: String,
}

impl HttpCompletionClient {
    /// 创建客户端
    ///
    /// 缺少 API 密钥属于永久错误
    pub fn new(config: HttpCompletionClientConfig) -> Result<Self, ServiceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ServiceError::permanent("API key is required"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::permanent(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &HttpCompletionClientConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionPort for HttpCompletionClient {
    async fn complete(&self, spec: &PromptSpec) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &spec.system,
                },
                ChatMessage {
                    role: "user",
                    content: &spec.user,
                },
            ],
            max_tokens: spec.max_tokens,
            temperature: spec.temperature,
        };

        tracing::debug!(
            url = %self.completions_url(),
            model = %self.config.model,
            kind = %spec.kind,
            max_tokens = spec.max_tokens,
            temperature = spec.temperature,
            "Sending completion request"
        );

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::transient(format!("Undecodable response body: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::transient("Response contained no choices"))?;

        tracing::info!(
            kind = %spec.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = content.len(),
            "Completion received"
        );

        Ok(content)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
