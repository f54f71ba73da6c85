//! 章节序列器
//!
//! 严格按顺序生成章节：第 i+1 章在第 i 章被接受之前不会开始生成。
//! 每次状态变更都记录日志并发布 ChapterStateChanged 事件。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::{AbortReason, CallFailure, PipelineAbort, Stage};
use crate::application::ports::{CompletionPort, PipelineEvent, PipelineEventPort, PromptSpec};
use crate::application::prompts::PromptBuilder;
use crate::application::retry::RetryPolicy;
use crate::application::settings::GenerationSettings;
use crate::domain::story::{
    ChapterPlan, ContinuityContext, GeneratedChapter, GenerationRequest, SequencerState,
};
use crate::domain::{clean_text_ending, strip_leading_headings, ValidationFailure};

use super::continuity::ContinuitySummarizer;

/// 章节序列的结果
#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    pub chapters: Vec<GeneratedChapter>,
    /// 最后一章之后的上下文（尾声使用）
    pub context: ContinuityContext,
}

// ============================================================================
// State Tracker
// ============================================================================

/// 跟踪一次运行的序列器状态并发布变更
struct StateTracker<'a> {
    run_id: Uuid,
    events: &'a dyn PipelineEventPort,
    state: SequencerState,
}

impl<'a> StateTracker<'a> {
    fn start(run_id: Uuid, events: &'a dyn PipelineEventPort) -> Self {
        let state = SequencerState::Pending { index: 1 };
        events.publish(PipelineEvent::ChapterStateChanged {
            run_id,
            state,
            words: None,
            error: None,
        });
        Self {
            run_id,
            events,
            state,
        }
    }

    fn transition(&mut self, next: SequencerState, words: Option<u32>, error: Option<String>) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Sequencer transition");
        self.state = next;
        self.events.publish(PipelineEvent::ChapterStateChanged {
            run_id: self.run_id,
            state: next,
            words,
            error,
        });
    }
}

// ============================================================================
// Chapter Sequencer
// ============================================================================

/// 章节序列器
pub struct ChapterSequencer {
    client: Arc<dyn CompletionPort>,
    events: Arc<dyn PipelineEventPort>,
    retry: RetryPolicy,
    settings: GenerationSettings,
    summarizer: ContinuitySummarizer,
}

impl ChapterSequencer {
    pub fn new(
        client: Arc<dyn CompletionPort>,
        events: Arc<dyn PipelineEventPort>,
        retry: RetryPolicy,
        settings: GenerationSettings,
    ) -> Self {
        let summarizer = ContinuitySummarizer::new(
            client.clone(),
            retry.clone(),
            settings.continuity,
            settings.continuity_max_chars,
            settings.ending_excerpt_chars,
            settings.max_tokens_per_call,
        );
        Self {
            client,
            events,
            retry,
            settings,
            summarizer,
        }
    }

    /// 按计划顺序生成所有章节
    pub async fn run(
        &self,
        run_id: Uuid,
        request: &GenerationRequest,
        plan: &ChapterPlan,
        cancel: &CancellationToken,
    ) -> Result<SequenceOutcome, PipelineAbort> {
        let total = plan.len() as u32;
        let prompts = PromptBuilder::new(request, self.settings.max_tokens_per_call);
        let mut tracker = StateTracker::start(run_id, self.events.as_ref());
        let mut context = ContinuityContext::empty();
        let mut accepted: Vec<GeneratedChapter> = Vec::with_capacity(plan.len());

        let abort = |reason: AbortReason, accepted: &[GeneratedChapter]| {
            PipelineAbort::new(reason)
                .with_plan(plan.clone())
                .with_accepted(accepted.to_vec())
        };

        for entry in plan.entries() {
            let index = entry.index();
            if index > 1 {
                tracker.transition(SequencerState::Pending { index }, None, None);
            }

            if cancel.is_cancelled() {
                info!(next_chapter = index, "Run cancelled at chapter boundary");
                return Err(abort(AbortReason::Cancelled { next_index: index }, &accepted));
            }

            let target = entry.target_word_count();
            let bounds = self.settings.validation.bounds(target);
            info!(chapter = index, total, target, "Starting chapter");

            let text = self
                .generate_validated(
                    &mut tracker,
                    request,
                    index,
                    target,
                    Stage::Chapter(index),
                    |failure| prompts.chapter(entry, total, &context, bounds, failure),
                    cancel,
                )
                .await
                .map_err(|reason| abort(reason, &accepted))?;

            let next_context = match self
                .summarizer
                .advance(request, &context, index, &text, cancel)
                .await
            {
                Ok(next) => next,
                Err(reason) => {
                    if let Ok(chapter) = GeneratedChapter::new(index, entry.heading(), text, "") {
                        accepted.push(chapter);
                    }
                    return Err(abort(reason, &accepted));
                }
            };

            let chapter = GeneratedChapter::new(
                index,
                entry.heading(),
                text,
                next_context.running_summary(),
            )
            .map_err(|e| abort(AbortReason::Invariant(e), &accepted))?;

            info!(
                chapter = index,
                words = chapter.word_count(),
                "Chapter accepted"
            );
            accepted.push(chapter);
            context = next_context;
        }

        tracker.transition(SequencerState::Complete, None, None);

        Ok(SequenceOutcome {
            chapters: accepted,
            context,
        })
    }

    /// 单次生成整篇故事，按第 1 章校验
    pub async fn run_single(
        &self,
        run_id: Uuid,
        request: &GenerationRequest,
        target: u32,
        cancel: &CancellationToken,
    ) -> Result<GeneratedChapter, PipelineAbort> {
        let prompts = PromptBuilder::new(request, self.settings.max_tokens_per_call);
        let mut tracker = StateTracker::start(run_id, self.events.as_ref());

        if cancel.is_cancelled() {
            return Err(PipelineAbort::new(AbortReason::Cancelled { next_index: 1 }));
        }

        let bounds = self.settings.validation.bounds(target);
        info!(target, "Generating story in a single call");

        let text = self
            .generate_validated(
                &mut tracker,
                request,
                1,
                target,
                Stage::Story,
                |_| prompts.story(target, bounds),
                cancel,
            )
            .await
            .map_err(PipelineAbort::new)?;

        tracker.transition(SequencerState::Complete, None, None);

        GeneratedChapter::new(1, "", text, "")
            .map_err(|e| PipelineAbort::new(AbortReason::Invariant(e)))
    }

    /// 生成尾声
    ///
    /// 失败不致命：返回 None 并记录警告。
    pub async fn write_epilogue(
        &self,
        request: &GenerationRequest,
        plan: &ChapterPlan,
        context: &ContinuityContext,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let spec = PromptBuilder::new(request, self.settings.max_tokens_per_call)
            .epilogue(plan, context);
        let client = &self.client;

        match self
            .retry
            .run_cancellable("epilogue", cancel, || client.complete(&spec))
            .await
        {
            Ok(raw) => {
                let text = clean_text_ending(&strip_leading_headings(&raw), request.language());
                if text.trim().is_empty() {
                    warn!("Epilogue was empty, assembling without it");
                    None
                } else {
                    info!(chars = text.len(), "Epilogue written");
                    Some(text)
                }
            }
            Err(CallFailure::Cancelled) => {
                info!("Run cancelled, skipping epilogue");
                None
            }
            Err(e) => {
                warn!(error = %e, "Epilogue generation failed, assembling without it");
                None
            }
        }
    }

    /// 生成 → 清理 → 校验，校验失败时带着失败原因重新生成
    #[allow(clippy::too_many_arguments)]
    async fn generate_validated<B>(
        &self,
        tracker: &mut StateTracker<'_>,
        request: &GenerationRequest,
        index: u32,
        target: u32,
        stage: Stage,
        build: B,
        cancel: &CancellationToken,
    ) -> Result<String, AbortReason>
    where
        B: Fn(Option<&ValidationFailure>) -> PromptSpec,
    {
        let max_attempts = self.settings.max_chapter_attempts.max(1);
        let label = stage.to_string();
        let client = &self.client;
        let mut last_failure: Option<ValidationFailure> = None;
        let mut attempt = 1;

        loop {
            tracker.transition(SequencerState::Generating { index, attempt }, None, None);
            let spec = build(last_failure.as_ref());

            let raw = match self
                .retry
                .run_cancellable(&label, cancel, || client.complete(&spec))
                .await
            {
                Ok(raw) => raw,
                Err(CallFailure::Cancelled) => {
                    info!(chapter = index, "Run cancelled during generation");
                    return Err(AbortReason::Cancelled { next_index: index });
                }
                Err(source) => {
                    error!(chapter = index, attempt, error = %source, "Generation call failed");
                    tracker.transition(
                        SequencerState::Failed { index },
                        None,
                        Some(source.to_string()),
                    );
                    return Err(AbortReason::Service { stage, source });
                }
            };

            tracker.transition(SequencerState::Validating { index, attempt }, None, None);
            let text = clean_text_ending(&strip_leading_headings(&raw), request.language());

            match self.settings.validation.validate(&text, target) {
                Ok(words) => {
                    tracker.transition(SequencerState::Accepted { index }, Some(words), None);
                    return Ok(text);
                }
                Err(failure) if attempt >= max_attempts => {
                    error!(
                        chapter = index,
                        attempts = attempt,
                        reason = %failure,
                        "Chapter rejected, giving up"
                    );
                    tracker.transition(
                        SequencerState::Failed { index },
                        None,
                        Some(failure.to_string()),
                    );
                    return Err(AbortReason::ChapterRejected {
                        index,
                        attempts: attempt,
                        last: failure,
                    });
                }
                Err(failure) => {
                    warn!(
                        chapter = index,
                        attempt,
                        reason = %failure,
                        "Chapter rejected, regenerating"
                    );
                    attempt += 1;
                    tracker.transition(
                        SequencerState::Retrying { index, attempt },
                        None,
                        Some(failure.to_string()),
                    );
                    last_failure = Some(failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{PromptKind, ServiceError};
    use crate::application::settings::ContinuityStrategy;
    use crate::domain::story::{ChapterPlanEntry, Language};
    use crate::infrastructure::adapters::ScriptedCompletionClient;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEvents {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl RecordingEvents {
        fn states(&self) -> Vec<SequencerState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    PipelineEvent::ChapterStateChanged { state, .. } => Some(*state),
                    _ => None,
                })
                .collect()
        }
    }

    impl PipelineEventPort for RecordingEvents {
        fn publish(&self, event: PipelineEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn prose(words: usize) -> String {
        "The wind moved over the quiet hills near town again. "
            .repeat(words / 10)
            .trim_end()
            .to_string()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("T", "P", "S", 12_000, Language::English).unwrap()
    }

    fn plan(chapters: u32) -> ChapterPlan {
        ChapterPlan::new(
            (1..=chapters)
                .map(|i| ChapterPlanEntry::new(i, format!("H{}", i), format!("S{}", i), 3000).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn sequencer(
        client: Arc<ScriptedCompletionClient>,
        events: Arc<RecordingEvents>,
    ) -> ChapterSequencer {
        ChapterSequencer::new(
            client,
            events,
            RetryPolicy::immediate(1),
            GenerationSettings::default(),
        )
    }

    fn assert_legal(states: &[SequencerState]) {
        for pair in states.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    fn happy_responder(spec: &PromptSpec, _: usize) -> Result<String, ServiceError> {
        match spec.kind {
            PromptKind::Chapter { .. } => Ok(prose(3000)),
            PromptKind::Continuity { index } => Ok(format!("Summary after chapter {}.", index)),
            _ => Ok(prose(600)),
        }
    }

    #[tokio::test]
    async fn test_chapters_run_in_order_with_continuity() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(happy_responder));
        let events = Arc::new(RecordingEvents::default());
        let outcome = sequencer(client.clone(), events.clone())
            .run(Uuid::new_v4(), &request(), &plan(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.chapters.len(), 4);
        let kinds: Vec<PromptKind> = client.calls().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PromptKind::Chapter { index: 1 },
                PromptKind::Continuity { index: 1 },
                PromptKind::Chapter { index: 2 },
                PromptKind::Continuity { index: 2 },
                PromptKind::Chapter { index: 3 },
                PromptKind::Continuity { index: 3 },
                PromptKind::Chapter { index: 4 },
                PromptKind::Continuity { index: 4 },
            ]
        );

        let calls = client.calls();
        assert!(calls[0].system.contains("This is the first chapter"));
        assert!(calls[2].system.contains("Summary after chapter 1."));
        assert!(calls[4].system.contains("Summary after chapter 2."));
        assert!(calls[6].system.contains("Summary after chapter 3."));
        assert_eq!(outcome.chapters[1].continuity_summary(), "Summary after chapter 2.");

        let states = events.states();
        assert_legal(&states);
        assert_eq!(states.first(), Some(&SequencerState::Pending { index: 1 }));
        assert_eq!(states.last(), Some(&SequencerState::Complete));
    }

    #[tokio::test]
    async fn test_short_chapter_fails_after_max_attempts() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(|spec, _| {
            match spec.kind {
                PromptKind::Chapter { .. } => Ok(prose(300)),
                _ => Ok("summary".to_string()),
            }
        }));
        let events = Arc::new(RecordingEvents::default());
        let abort = sequencer(client.clone(), events.clone())
            .run(Uuid::new_v4(), &request(), &plan(4), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            abort.reason,
            AbortReason::ChapterRejected {
                index: 1,
                attempts: 3,
                last: ValidationFailure::TooShort { words: 300, .. }
            }
        ));
        assert!(abort.accepted.is_empty());
        assert_eq!(abort.plan.map(|p| p.len()), Some(4));
        assert_eq!(client.call_count(), 3);
        assert!(client
            .calls()
            .iter()
            .all(|c| c.kind == PromptKind::Chapter { index: 1 }));

        let states = events.states();
        assert_legal(&states);
        assert_eq!(states.last(), Some(&SequencerState::Failed { index: 1 }));
    }

    #[tokio::test]
    async fn test_retry_uses_amended_prompt() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(|spec, call| {
            match (spec.kind, call) {
                (PromptKind::Chapter { .. }, 0) => Ok(prose(300)),
                (PromptKind::Chapter { .. }, _) => Ok(prose(3000)),
                _ => Ok("summary".to_string()),
            }
        }));
        let events = Arc::new(RecordingEvents::default());
        let outcome = sequencer(client.clone(), events.clone())
            .run(Uuid::new_v4(), &request(), &plan(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.chapters[0].word_count(), 3000);
        let calls = client.calls();
        assert!(!calls[0].system.contains("too short"));
        assert!(calls[1].system.contains("too short at 300 words"));
        assert!(events
            .states()
            .contains(&SequencerState::Retrying { index: 1, attempt: 2 }));
    }

    #[tokio::test]
    async fn test_permanent_error_keeps_accepted_chapters() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(|spec, _| {
            match spec.kind {
                PromptKind::Chapter { index: 2 } => Err(ServiceError::permanent("401")),
                _ => happy_responder(spec, 0),
            }
        }));
        let events = Arc::new(RecordingEvents::default());
        let abort = sequencer(client, events.clone())
            .run(Uuid::new_v4(), &request(), &plan(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            abort.reason,
            AbortReason::Service {
                stage: Stage::Chapter(2),
                source: CallFailure::Permanent(_)
            }
        ));
        assert_eq!(abort.accepted.len(), 1);
        assert_eq!(abort.accepted[0].index(), 1);
        assert_legal(&events.states());
    }

    #[tokio::test]
    async fn test_cancel_stops_at_chapter_boundary() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let client = Arc::new(ScriptedCompletionClient::with_responder(move |spec, call| {
            if matches!(spec.kind, PromptKind::Continuity { index: 1 }) {
                trigger.cancel();
            }
            happy_responder(spec, call)
        }));
        let events = Arc::new(RecordingEvents::default());
        let abort = sequencer(client.clone(), events)
            .run(Uuid::new_v4(), &request(), &plan(3), &cancel)
            .await
            .unwrap_err();

        assert_eq!(abort.reason, AbortReason::Cancelled { next_index: 2 });
        assert_eq!(abort.accepted.len(), 1);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_single_shot_is_validated() {
        let client = Arc::new(ScriptedCompletionClient::from_responses(vec![Ok(format!(
            "# T\n\n{}",
            prose(1000)
        ))]));
        let events = Arc::new(RecordingEvents::default());
        let chapter = sequencer(client.clone(), events.clone())
            .run_single(Uuid::new_v4(), &request(), 1000, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(chapter.word_count(), 1000);
        assert!(!chapter.text().starts_with('#'));
        assert_eq!(client.calls()[0].kind, PromptKind::Story);
        assert_eq!(events.states().last(), Some(&SequencerState::Complete));
    }

    #[tokio::test]
    async fn test_heuristic_continuity_skips_summary_calls() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(happy_responder));
        let settings = GenerationSettings {
            continuity: ContinuityStrategy::Heuristic,
            ..GenerationSettings::default()
        };
        let seq = ChapterSequencer::new(
            client.clone(),
            Arc::new(RecordingEvents::default()),
            RetryPolicy::immediate(1),
            settings,
        );
        let outcome = seq
            .run(Uuid::new_v4(), &request(), &plan(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert!(outcome.context.running_summary().contains("Chapter 2:"));
    }

    #[tokio::test]
    async fn test_epilogue_failure_is_not_fatal() {
        let client = Arc::new(ScriptedCompletionClient::from_responses(vec![Err(
            ServiceError::permanent("400"),
        )]));
        let seq = sequencer(client, Arc::new(RecordingEvents::default()));
        let epilogue = seq
            .write_epilogue(&request(), &plan(2), &ContinuityContext::empty(), &CancellationToken::new())
            .await;
        assert!(epilogue.is_none());
    }
}
