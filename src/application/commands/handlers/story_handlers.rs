//! Story Command Handlers

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::commands::GenerateStory;
use crate::application::error::{AbortReason, PipelineAbort, PipelineError};
use crate::application::pipeline::{ChapterSequencer, OutlineGenerator};
use crate::application::ports::{CompletionPort, PipelineEvent, PipelineEventPort};
use crate::application::retry::RetryPolicy;
use crate::application::settings::GenerationSettings;
use crate::domain::story::{ChapterPlan, GenerationRequest, StoryDocument};
use crate::domain::{assemble, assemble_single_shot, GenerationMode};

// ============================================================================
// GenerateStory
// ============================================================================

/// 生成故事响应
#[derive(Debug, Clone)]
pub struct GenerateStoryResponse {
    pub run_id: Uuid,
    pub document: StoryDocument,
    /// 章节计划（单次生成时为 None）
    pub plan: Option<ChapterPlan>,
    pub mode: GenerationMode,
    /// 应用下限后的目标字数
    pub effective_target: u32,
    /// 服务返回的原始大纲
    pub raw_outline: Option<String>,
}

/// GenerateStory Handler - 运行一次完整的生成流水线
///
/// 每次 handle 都是独立的运行，handler 本身不保存运行状态，可并发调用。
pub struct GenerateStoryHandler {
    events: Arc<dyn PipelineEventPort>,
    settings: GenerationSettings,
    outline: OutlineGenerator,
    sequencer: ChapterSequencer,
}

impl GenerateStoryHandler {
    pub fn new(
        client: Arc<dyn CompletionPort>,
        events: Arc<dyn PipelineEventPort>,
        settings: GenerationSettings,
        retry: RetryPolicy,
    ) -> Self {
        let outline =
            OutlineGenerator::new(client.clone(), retry.clone(), settings.max_tokens_per_call);
        let sequencer =
            ChapterSequencer::new(client, events.clone(), retry, settings.clone());
        Self {
            events,
            settings,
            outline,
            sequencer,
        }
    }

    pub async fn handle(
        &self,
        command: GenerateStory,
        cancel: CancellationToken,
    ) -> Result<GenerateStoryResponse, PipelineError> {
        let run_id = command.run_id.unwrap_or_else(Uuid::new_v4);
        let span = info_span!("story_run", run_id = %run_id, title = %command.title);

        self.execute(run_id, command, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        command: GenerateStory,
        cancel: CancellationToken,
    ) -> Result<GenerateStoryResponse, PipelineError> {
        let request = command.to_request()?;

        let requested = request.target_word_count();
        let effective_target = self.settings.effective_target(requested);
        if effective_target != requested {
            warn!(
                requested,
                effective = effective_target,
                "Target word count below minimum, raised"
            );
        }

        let mode = self
            .settings
            .length_policy
            .decide(effective_target, self.settings.chapter_mode);

        // 单次调用写不出超过 token 上限的篇幅
        let mut effective_target = effective_target;
        let word_cap = self.settings.single_shot_word_cap();
        if mode == GenerationMode::SingleShot && effective_target > word_cap {
            warn!(
                requested = effective_target,
                effective = word_cap,
                max_tokens = self.settings.max_tokens_per_call,
                "Target too high for single call generation, reduced"
            );
            effective_target = word_cap;
        }
        info!(
            mode = ?mode,
            target = effective_target,
            language = %request.language(),
            "Generation mode selected"
        );
        self.events.publish(PipelineEvent::ModeSelected {
            run_id,
            mode,
            effective_target,
        });

        let (document, plan, raw_outline) = match mode {
            GenerationMode::SingleShot => {
                let chapter = self
                    .sequencer
                    .run_single(run_id, &request, effective_target, &cancel)
                    .await
                    .map_err(|abort| self.fail(run_id, abort))?;
                (assemble_single_shot(&request, &chapter), None, None)
            }
            GenerationMode::Chaptered { .. } => {
                let (document, plan, raw) = self
                    .run_chaptered(run_id, &request, &mode, effective_target, &cancel)
                    .await
                    .map_err(|abort| self.fail(run_id, abort))?;
                (document, Some(plan), raw)
            }
        };

        info!(
            sections = document.section_count(),
            words = document.word_count(),
            "Story complete"
        );
        self.events.publish(PipelineEvent::Completed {
            run_id,
            sections: document.section_count() as u32,
            words: document.word_count(),
        });

        Ok(GenerateStoryResponse {
            run_id,
            document,
            plan,
            mode,
            effective_target,
            raw_outline,
        })
    }

    async fn run_chaptered(
        &self,
        run_id: Uuid,
        request: &GenerationRequest,
        mode: &GenerationMode,
        effective_target: u32,
        cancel: &CancellationToken,
    ) -> Result<(StoryDocument, ChapterPlan, Option<String>), PipelineAbort> {
        let outline = self
            .outline
            .generate(request, &mode.targets(), cancel)
            .await
            .map_err(PipelineAbort::new)?;
        let plan = outline.plan;

        if !plan.is_within_tolerance(effective_target) {
            warn!(
                planned = plan.total_target(),
                requested = effective_target,
                "Chapter plan total outside tolerance"
            );
        }
        self.events.publish(PipelineEvent::OutlineReady {
            run_id,
            chapters: plan.len() as u32,
            synthesized: outline.synthesized.len() as u32,
        });

        let sequence = self.sequencer.run(run_id, request, &plan, cancel).await?;

        let mut document = assemble(request, &plan, &sequence.chapters).map_err(|e| {
            PipelineAbort::new(AbortReason::Invariant(e))
                .with_plan(plan.clone())
                .with_accepted(sequence.chapters.clone())
        })?;

        if self.settings.epilogue {
            if let Some(epilogue) = self
                .sequencer
                .write_epilogue(request, &plan, &sequence.context, cancel)
                .await
            {
                document = document.with_epilogue(epilogue);
            }
        }

        Ok((document, plan, outline.raw_outline))
    }

    /// 记录中止并发布 Aborted 事件
    fn fail(&self, run_id: Uuid, abort: PipelineAbort) -> PipelineError {
        error!(
            reason = %abort.reason,
            accepted = abort.accepted.len(),
            "Story run aborted"
        );
        self.events.publish(PipelineEvent::Aborted {
            run_id,
            reason: abort.reason.to_string(),
            accepted: abort.accepted.len() as u32,
        });
        PipelineError::from(abort)
    }
}
