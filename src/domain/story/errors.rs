//! Story Context - Errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoryError {
    #[error("无效的标题: {0}")]
    InvalidTitle(String),

    #[error("无效的故事梗概: {0}")]
    InvalidPremise(String),

    #[error("无效的目标字数: {0}")]
    InvalidWordCount(u32),

    #[error("无效的章节计划: {0}")]
    InvalidPlan(String),

    #[error("章节与计划不匹配: {0}")]
    ChapterMismatch(String),
}
