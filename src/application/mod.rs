//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（CompletionPort、PipelineEventPort）
//! - commands: 命令及处理器
//! - pipeline: 大纲生成、章节序列器、连续性摘要
//! - prompts / retry / settings: 提示词、重试策略、生成参数
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod prompts;
pub mod retry;
pub mod settings;

// Re-exports
pub use commands::{
    handlers::{GenerateStoryHandler, GenerateStoryResponse},
    GenerateStory,
};

pub use error::{AbortReason, CallFailure, PipelineAbort, PipelineError, Stage};

pub use pipeline::{ChapterSequencer, ContinuitySummarizer, OutlineGenerator, OutlineOutcome, SequenceOutcome};

pub use ports::{CompletionPort, PipelineEvent, PipelineEventPort, PromptKind, PromptSpec, ServiceError};

pub use prompts::PromptBuilder;
pub use retry::RetryPolicy;
pub use settings::{ContinuityStrategy, GenerationSettings};
