//! Story Context - 故事限界上下文
//!
//! 职责:
//! - 生成请求与连续性上下文
//! - 章节计划与已接受章节
//! - 章节序列器状态
//! - 最终文档聚合

mod aggregate;
mod entities;
mod errors;
mod state;
mod value_objects;

pub use aggregate::{StoryDocument, StorySection};
pub use entities::{
    chapter_heading, ChapterPlan, ChapterPlanEntry, GeneratedChapter, ParsedChapter,
    PLAN_TOLERANCE,
};
pub use errors::StoryError;
pub use state::SequencerState;
pub use value_objects::{ContinuityContext, GenerationRequest, Language};
