//! 大纲生成器
//!
//! 一次服务调用生成章节大纲，宽松解析后补齐缺失条目。
//! 大纲不完整属于可恢复的降级：记录警告并合成最小条目，不中止流水线。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::error::{AbortReason, CallFailure, Stage};
use crate::application::ports::CompletionPort;
use crate::application::prompts::PromptBuilder;
use crate::application::retry::RetryPolicy;
use crate::domain::story::{ChapterPlan, GenerationRequest};
use crate::domain::parse_outline;

/// 大纲生成结果
#[derive(Debug, Clone)]
pub struct OutlineOutcome {
    pub plan: ChapterPlan,
    /// 合成（非解析所得）的章节编号
    pub synthesized: Vec<u32>,
    /// 服务返回的原始大纲文本（服务不可用时为 None）
    pub raw_outline: Option<String>,
}

/// 大纲生成器
pub struct OutlineGenerator {
    client: Arc<dyn CompletionPort>,
    retry: RetryPolicy,
    max_tokens_per_call: u32,
}

impl OutlineGenerator {
    pub fn new(client: Arc<dyn CompletionPort>, retry: RetryPolicy, max_tokens_per_call: u32) -> Self {
        Self {
            client,
            retry,
            max_tokens_per_call,
        }
    }

    /// 生成章节计划
    ///
    /// `targets` 的长度即章节数，每个元素是对应章节的目标字数。
    /// - 永久错误 → 中止
    /// - 重试耗尽 → 整个计划由合成条目组成
    /// - 解析不完整 → 缺失条目由合成条目补齐
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        targets: &[u32],
        cancel: &CancellationToken,
    ) -> Result<OutlineOutcome, AbortReason> {
        let expected = targets.len() as u32;
        let spec = PromptBuilder::new(request, self.max_tokens_per_call).outline(targets);

        info!(chapters = expected, "Generating outline");

        let client = &self.client;
        let result = self
            .retry
            .run_cancellable("outline", cancel, || client.complete(&spec))
            .await;

        let raw = match result {
            Ok(text) => Some(text),
            Err(CallFailure::Exhausted { attempts, last }) => {
                warn!(
                    attempts,
                    error = %last,
                    "Outline service unavailable, synthesizing all chapter entries"
                );
                None
            }
            Err(CallFailure::Cancelled) => {
                return Err(AbortReason::Cancelled { next_index: 1 });
            }
            Err(source @ CallFailure::Permanent(_)) => {
                return Err(AbortReason::Service {
                    stage: Stage::Outline,
                    source,
                });
            }
        };

        let parsed = match raw.as_deref() {
            Some(text) => parse_outline(text, expected),
            None => parse_outline("", expected),
        };

        let (plan, synthesized) = ChapterPlan::complete_from(&parsed.entries, request, targets)
            .map_err(AbortReason::Invariant)?;

        if !synthesized.is_empty() && raw.is_some() {
            warn!(
                recovered = parsed.entries.len(),
                expected,
                completeness = parsed.completeness(),
                synthesized = ?synthesized,
                "Outline degraded, synthesized missing chapter entries"
            );
        }

        info!(
            chapters = plan.len(),
            synthesized = synthesized.len(),
            total_target = plan.total_target(),
            "Outline ready"
        );

        Ok(OutlineOutcome {
            plan,
            synthesized,
            raw_outline: raw,
        })
    }
}
