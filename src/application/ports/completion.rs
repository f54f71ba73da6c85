//! Completion Port - LLM 文本补全抽象
//!
//! 定义一次"提交提示词、取回文本"的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// 补全服务错误
///
/// - Transient: 限流、超时、5xx 等，值得重试
/// - Permanent: 凭证无效、请求格式错误等，重试也无济于事
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("Permanent service error: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// 提示词用途（用于日志和测试断言）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Story,
    Outline,
    Chapter { index: u32 },
    Continuity { index: u32 },
    Epilogue,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptKind::Story => write!(f, "story"),
            PromptKind::Outline => write!(f, "outline"),
            PromptKind::Chapter { index } => write!(f, "chapter {}", index),
            PromptKind::Continuity { index } => write!(f, "continuity {}", index),
            PromptKind::Epilogue => write!(f, "epilogue"),
        }
    }
}

/// 补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSpec {
    pub kind: PromptKind,
    /// 系统提示词
    pub system: String,
    /// 用户提示词
    pub user: String,
    /// 本次调用的最大输出 token 数
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Completion Port
///
/// 外部 LLM 服务的抽象接口。服务被视为返回非结构化文本的黑盒。
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// 执行一次补全调用（不含重试，重试由调用方的策略负责）
    async fn complete(&self, spec: &PromptSpec) -> Result<String, ServiceError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
