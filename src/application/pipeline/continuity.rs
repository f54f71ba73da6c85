//! 连续性摘要
//!
//! 每章被接受后，从上一份上下文和新章节推导下一章的 ContinuityContext。
//! 上下文的大小只取决于配置的上限，与章节长度无关。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::error::{AbortReason, CallFailure, Stage};
use crate::application::ports::CompletionPort;
use crate::application::prompts::PromptBuilder;
use crate::application::retry::RetryPolicy;
use crate::application::settings::ContinuityStrategy;
use crate::domain::story::{ContinuityContext, GenerationRequest};
use crate::domain::text_cleaner::{first_sentences, tail_excerpt};

/// 启发式摘要从每章开头取的句子数
const HEURISTIC_SENTENCES: usize = 3;

/// 连续性摘要器
pub struct ContinuitySummarizer {
    client: Arc<dyn CompletionPort>,
    retry: RetryPolicy,
    strategy: ContinuityStrategy,
    max_summary_chars: usize,
    ending_excerpt_chars: usize,
    max_tokens_per_call: u32,
}

impl ContinuitySummarizer {
    pub fn new(
        client: Arc<dyn CompletionPort>,
        retry: RetryPolicy,
        strategy: ContinuityStrategy,
        max_summary_chars: usize,
        ending_excerpt_chars: usize,
        max_tokens_per_call: u32,
    ) -> Self {
        Self {
            client,
            retry,
            strategy,
            max_summary_chars,
            ending_excerpt_chars,
            max_tokens_per_call,
        }
    }

    /// 启发式：在旧摘要后追加本章开头的几句
    fn heuristic_summary(
        &self,
        request: &GenerationRequest,
        previous: &ContinuityContext,
        index: u32,
        chapter_text: &str,
    ) -> String {
        let line = format!(
            "{} {}: {}",
            request.language().chapter_word(),
            index,
            first_sentences(chapter_text, HEURISTIC_SENTENCES)
        );
        if previous.running_summary().is_empty() {
            line
        } else {
            format!("{}\n{}", previous.running_summary(), line)
        }
    }

    /// 推导下一章的上下文
    ///
    /// - llm 策略下永久错误 → 中止
    /// - 重试耗尽或返回空摘要 → 退回启发式
    pub async fn advance(
        &self,
        request: &GenerationRequest,
        previous: &ContinuityContext,
        index: u32,
        chapter_text: &str,
        cancel: &CancellationToken,
    ) -> Result<ContinuityContext, AbortReason> {
        let summary = match self.strategy {
            ContinuityStrategy::Heuristic => {
                self.heuristic_summary(request, previous, index, chapter_text)
            }
            ContinuityStrategy::Llm => {
                let spec = PromptBuilder::new(request, self.max_tokens_per_call).continuity(
                    previous.running_summary(),
                    index,
                    chapter_text,
                );
                let client = &self.client;
                let result = self
                    .retry
                    .run_cancellable("continuity", cancel, || client.complete(&spec))
                    .await;

                match result {
                    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                    Ok(_) => {
                        warn!(chapter = index, "Empty continuity summary, using heuristic");
                        self.heuristic_summary(request, previous, index, chapter_text)
                    }
                    Err(CallFailure::Exhausted { attempts, last }) => {
                        warn!(
                            chapter = index,
                            attempts,
                            error = %last,
                            "Continuity summary unavailable, using heuristic"
                        );
                        self.heuristic_summary(request, previous, index, chapter_text)
                    }
                    Err(CallFailure::Cancelled) => {
                        return Err(AbortReason::Cancelled {
                            next_index: index + 1,
                        });
                    }
                    Err(source @ CallFailure::Permanent(_)) => {
                        return Err(AbortReason::Service {
                            stage: Stage::Continuity(index),
                            source,
                        });
                    }
                }
            }
        };

        let ending = tail_excerpt(chapter_text, self.ending_excerpt_chars);
        let context = ContinuityContext::bounded(
            &summary,
            &ending,
            index,
            self.max_summary_chars,
            self.ending_excerpt_chars,
        );

        debug!(
            chapter = index,
            chars = context.char_len(),
            preview = %context.preview(80),
            "Continuity context updated"
        );

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{PromptKind, ServiceError};
    use crate::domain::story::Language;
    use crate::infrastructure::adapters::ScriptedCompletionClient;

    fn request() -> GenerationRequest {
        GenerationRequest::new("T", "P", "S", 9000, Language::English).unwrap()
    }

    fn chapter_text() -> String {
        let body = "Mara crossed the bridge at dawn. The guards let her pass. ".repeat(200);
        format!("{}\n\nShe reached the tower and knocked twice.", body.trim())
    }

    fn summarizer(client: Arc<ScriptedCompletionClient>, strategy: ContinuityStrategy) -> ContinuitySummarizer {
        ContinuitySummarizer::new(client, RetryPolicy::immediate(1), strategy, 300, 120, 15_000)
    }

    #[tokio::test]
    async fn test_llm_summary_is_bounded() {
        let long_summary = "Mara is in the tower. ".repeat(100);
        let client = Arc::new(ScriptedCompletionClient::from_responses(vec![Ok(long_summary)]));
        let context = summarizer(client.clone(), ContinuityStrategy::Llm)
            .advance(&request(), &ContinuityContext::empty(), 1, &chapter_text(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(context.running_summary().chars().count() <= 300);
        assert!(context.recent_ending().chars().count() <= 120);
        assert!(context.recent_ending().ends_with("knocked twice."));
        assert_eq!(context.through_chapter(), 1);
        assert_eq!(client.calls()[0].kind, PromptKind::Continuity { index: 1 });
    }

    #[tokio::test]
    async fn test_heuristic_makes_no_calls() {
        let client = Arc::new(ScriptedCompletionClient::from_responses(vec![]));
        let previous = ContinuityContext::bounded("Chapter 1: Earlier.", "", 1, 300, 120);
        let context = summarizer(client.clone(), ContinuityStrategy::Heuristic)
            .advance(&request(), &previous, 2, &chapter_text(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.call_count(), 0);
        assert!(context.running_summary().contains("Chapter 2: Mara crossed the bridge at dawn."));
        assert!(context.running_summary().chars().count() <= 300);
    }

    #[tokio::test]
    async fn test_exhausted_falls_back_to_heuristic() {
        let client = Arc::new(ScriptedCompletionClient::with_responder(|_, _| {
            Err(ServiceError::transient("timeout"))
        }));
        let context = summarizer(client.clone(), ContinuityStrategy::Llm)
            .advance(&request(), &ContinuityContext::empty(), 1, &chapter_text(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.call_count(), 2);
        assert!(context.running_summary().starts_with("Chapter 1: Mara"));
    }

    #[tokio::test]
    async fn test_permanent_error_aborts() {
        let client = Arc::new(ScriptedCompletionClient::from_responses(vec![Err(
            ServiceError::permanent("403"),
        )]));
        let result = summarizer(client, ContinuityStrategy::Llm)
            .advance(&request(), &ContinuityContext::empty(), 3, &chapter_text(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(AbortReason::Service {
                stage: Stage::Continuity(3),
                ..
            })
        ));
    }
}
