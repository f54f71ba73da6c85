//! 应用层错误定义
//!
//! - CallFailure: 在重试策略下执行一次服务调用的结果
//! - PipelineError / PipelineAbort: 一次生成运行的失败

use thiserror::Error;

use crate::domain::story::{ChapterPlan, GeneratedChapter, StoryError};
use crate::domain::ValidationFailure;

/// 在重试策略下执行调用失败
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// 永久错误，未重试
    #[error("Permanent service error: {0}")]
    Permanent(String),

    /// 暂时性错误重试耗尽
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    /// 调用期间运行被取消，结果被丢弃
    #[error("Cancelled")]
    Cancelled,
}

/// 失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Story,
    Outline,
    Chapter(u32),
    Continuity(u32),
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Story => write!(f, "story"),
            Stage::Outline => write!(f, "outline"),
            Stage::Chapter(index) => write!(f, "chapter {}", index),
            Stage::Continuity(index) => write!(f, "continuity summary after chapter {}", index),
        }
    }
}

/// 中止原因
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// 服务失败（永久错误，或无法降级处理的重试耗尽）
    #[error("Service failure during {stage}: {source}")]
    Service { stage: Stage, source: CallFailure },

    /// 章节校验失败次数达到上限
    #[error("Chapter {index} rejected after {attempts} attempts: {last}")]
    ChapterRejected {
        index: u32,
        attempts: u32,
        last: ValidationFailure,
    },

    /// 在章节边界被取消
    #[error("Cancelled before chapter {next_index}")]
    Cancelled { next_index: u32 },

    /// 领域不变量被破坏（计划或组装）
    #[error("Invariant violated: {0}")]
    Invariant(StoryError),
}

/// 运行中止
///
/// 不产生 StoryDocument，但已接受的章节和章节计划仍然交给调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineAbort {
    pub reason: AbortReason,
    pub plan: Option<ChapterPlan>,
    pub accepted: Vec<GeneratedChapter>,
}

impl PipelineAbort {
    pub fn new(reason: AbortReason) -> Self {
        Self {
            reason,
            plan: None,
            accepted: Vec::new(),
        }
    }

    pub fn with_plan(mut self, plan: ChapterPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_accepted(mut self, accepted: Vec<GeneratedChapter>) -> Self {
        self.accepted = accepted;
        self
    }
}

impl std::fmt::Display for PipelineAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} chapters accepted)",
            self.reason,
            self.accepted.len()
        )
    }
}

/// 流水线错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 请求无效
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 运行中止
    #[error("Pipeline aborted: {0}")]
    Aborted(Box<PipelineAbort>),
}

impl PipelineError {
    /// 中止详情（请求无效时没有）
    pub fn abort(&self) -> Option<&PipelineAbort> {
        match self {
            PipelineError::Aborted(abort) => Some(abort),
            PipelineError::InvalidRequest(_) => None,
        }
    }
}

impl From<StoryError> for PipelineError {
    fn from(err: StoryError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<PipelineAbort> for PipelineError {
    fn from(abort: PipelineAbort) -> Self {
        Self::Aborted(Box::new(abort))
    }
}
