//! 长度策略
//!
//! 决定一次生成还是分章生成，并计算每章目标字数。纯函数，没有错误情况。

use serde::Serialize;

/// 短篇与中篇的分界（词）
pub const DEFAULT_SINGLE_SHOT_THRESHOLD: u32 = 3000;

/// 理想章节长度（词）
pub const DEFAULT_IDEAL_CHAPTER_WORDS: u32 = 3000;

/// 生成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GenerationMode {
    SingleShot,
    Chaptered {
        chapter_count: u32,
        /// 前 chapter_count - 1 章的目标字数
        per_chapter_target: u32,
        /// 最后一章的目标字数（包含余数）
        final_chapter_target: u32,
    },
}

impl GenerationMode {
    pub fn is_chaptered(&self) -> bool {
        matches!(self, GenerationMode::Chaptered { .. })
    }

    pub fn chapter_count(&self) -> u32 {
        match self {
            GenerationMode::SingleShot => 1,
            GenerationMode::Chaptered { chapter_count, .. } => *chapter_count,
        }
    }

    /// 每章的目标字数列表（单次生成时为空）
    pub fn targets(&self) -> Vec<u32> {
        match *self {
            GenerationMode::SingleShot => Vec::new(),
            GenerationMode::Chaptered {
                chapter_count,
                per_chapter_target,
                final_chapter_target,
            } => {
                let mut targets = vec![per_chapter_target; chapter_count.saturating_sub(1) as usize];
                targets.push(final_chapter_target);
                targets
            }
        }
    }
}

/// 长度策略配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPolicy {
    pub single_shot_threshold: u32,
    pub ideal_chapter_words: u32,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            single_shot_threshold: DEFAULT_SINGLE_SHOT_THRESHOLD,
            ideal_chapter_words: DEFAULT_IDEAL_CHAPTER_WORDS,
        }
    }
}

impl LengthPolicy {
    pub fn new(single_shot_threshold: u32, ideal_chapter_words: u32) -> Self {
        Self {
            single_shot_threshold,
            ideal_chapter_words: ideal_chapter_words.max(1),
        }
    }

    /// 决定生成模式
    ///
    /// - 未启用分章或 target ≤ 阈值 → SingleShot
    /// - 否则 chapter_count = ceil(target / ideal)，
    ///   余数全部分给最后一章，所有章节目标之和恰好等于 target
    pub fn decide(&self, target_word_count: u32, chapter_mode_enabled: bool) -> GenerationMode {
        if !chapter_mode_enabled || target_word_count <= self.single_shot_threshold {
            return GenerationMode::SingleShot;
        }

        let ideal = self.ideal_chapter_words.max(1);
        let chapter_count = target_word_count.div_ceil(ideal);
        let per_chapter_target = target_word_count / chapter_count;
        let final_chapter_target =
            target_word_count - per_chapter_target * (chapter_count - 1);

        GenerationMode::Chaptered {
            chapter_count,
            per_chapter_target,
            final_chapter_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shot_at_or_below_threshold() {
        let policy = LengthPolicy::default();
        for target in [1, 500, 2999, 3000] {
            assert_eq!(policy.decide(target, true), GenerationMode::SingleShot);
        }
    }

    #[test]
    fn test_disabled_chapter_mode_is_single_shot() {
        let policy = LengthPolicy::default();
        assert_eq!(policy.decide(50_000, false), GenerationMode::SingleShot);
        assert!(GenerationMode::SingleShot.targets().is_empty());
    }

    #[test]
    fn test_twelve_thousand_words_gives_four_chapters() {
        let mode = LengthPolicy::new(3000, 3000).decide(12_000, true);
        assert_eq!(
            mode,
            GenerationMode::Chaptered {
                chapter_count: 4,
                per_chapter_target: 3000,
                final_chapter_target: 3000,
            }
        );
        assert_eq!(mode.targets(), vec![3000, 3000, 3000, 3000]);
    }

    #[test]
    fn test_remainder_goes_to_final_chapter() {
        let mode = LengthPolicy::new(3000, 3000).decide(10_001, true);
        assert_eq!(mode.chapter_count(), 4);
        assert_eq!(mode.targets(), vec![2500, 2500, 2500, 2501]);
    }

    #[test]
    fn test_chaptered_sums_exactly_for_all_targets() {
        let policy = LengthPolicy::new(3000, 3000);
        for target in (3001..40_000).step_by(97) {
            let mode = policy.decide(target, true);
            let expected_count = (target + 2999) / 3000;
            assert_eq!(mode.chapter_count(), expected_count, "target {}", target);
            let targets = mode.targets();
            assert_eq!(targets.len() as u32, expected_count);
            assert_eq!(targets.iter().sum::<u32>(), target, "target {}", target);
            assert!(targets.iter().all(|t| *t > 0));
        }
    }

    #[test]
    fn test_threshold_independent_of_chapter_length() {
        let policy = LengthPolicy::new(5000, 2000);
        assert_eq!(policy.decide(5000, true), GenerationMode::SingleShot);
        assert_eq!(policy.decide(5001, true).chapter_count(), 3);
    }
}
