//! 生成流水线
//!
//! - OutlineGenerator: 大纲 → ChapterPlan
//! - ChapterSequencer: 章节状态机
//! - ContinuitySummarizer: 章节之间的连续性上下文

mod continuity;
mod outline;
mod sequencer;

pub use continuity::ContinuitySummarizer;
pub use outline::{OutlineGenerator, OutlineOutcome};
pub use sequencer::{ChapterSequencer, SequenceOutcome};
