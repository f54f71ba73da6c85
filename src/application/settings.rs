//! 生成参数
//!
//! 由配置层构建，流水线运行期间只读

use serde::{Deserialize, Serialize};

use crate::domain::{LengthPolicy, ValidationPolicy};

use super::prompts::{DEFAULT_MAX_TOKENS_PER_CALL, TOKEN_WORD_RATIO};

/// 连续性摘要策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityStrategy {
    /// 每章接受后额外调用一次服务更新摘要
    #[default]
    Llm,
    /// 截取章节开头的句子，不调用服务
    Heuristic,
}

/// 生成参数
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub chapter_mode: bool,
    pub length_policy: LengthPolicy,
    /// 目标字数下限，低于此值时提升到此值
    pub min_target_words: u32,
    /// 每章（以及单次故事）的最大生成尝试次数
    pub max_chapter_attempts: u32,
    pub validation: ValidationPolicy,
    pub continuity: ContinuityStrategy,
    pub continuity_max_chars: usize,
    pub ending_excerpt_chars: usize,
    pub epilogue: bool,
    pub max_tokens_per_call: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            chapter_mode: true,
            length_policy: LengthPolicy::default(),
            min_target_words: 500,
            max_chapter_attempts: 3,
            validation: ValidationPolicy::default(),
            continuity: ContinuityStrategy::Llm,
            continuity_max_chars: 2400,
            ending_excerpt_chars: 800,
            epilogue: false,
            max_tokens_per_call: DEFAULT_MAX_TOKENS_PER_CALL,
        }
    }
}

impl GenerationSettings {
    /// 应用目标字数下限
    pub fn effective_target(&self, requested: u32) -> u32 {
        requested.max(self.min_target_words)
    }

    /// 单次调用在 token 上限内能写出的最多词数
    pub fn single_shot_word_cap(&self) -> u32 {
        ((self.max_tokens_per_call as f64 / TOKEN_WORD_RATIO).floor() as u32).max(1)
    }
}
