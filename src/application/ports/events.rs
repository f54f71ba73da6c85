//! Pipeline Event Port - 进度事件推送抽象

use serde::Serialize;
use uuid::Uuid;

use crate::domain::story::SequencerState;
use crate::domain::GenerationMode;

/// 流水线进度事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// 长度策略已决定生成模式
    ModeSelected {
        run_id: Uuid,
        mode: GenerationMode,
        effective_target: u32,
    },
    /// 章节计划就绪
    OutlineReady {
        run_id: Uuid,
        chapters: u32,
        synthesized: u32,
    },
    /// 章节序列器状态变更
    ChapterStateChanged {
        run_id: Uuid,
        state: SequencerState,
        #[serde(skip_serializing_if = "Option::is_none")]
        words: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// 文档组装完成
    Completed {
        run_id: Uuid,
        sections: u32,
        words: u32,
    },
    /// 运行中止
    Aborted {
        run_id: Uuid,
        reason: String,
        accepted: u32,
    },
}

impl PipelineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::ModeSelected { run_id, .. }
            | PipelineEvent::OutlineReady { run_id, .. }
            | PipelineEvent::ChapterStateChanged { run_id, .. }
            | PipelineEvent::Completed { run_id, .. }
            | PipelineEvent::Aborted { run_id, .. } => *run_id,
        }
    }
}

/// Pipeline Event Port
///
/// 发布是即发即弃的：没有订阅者时事件被丢弃，不影响流水线
pub trait PipelineEventPort: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}
