//! Story Context - Entities

use serde::Serialize;

use super::{GenerationRequest, Language, StoryError};

/// 章节计划总字数与请求目标字数之间允许的偏差
pub const PLAN_TOLERANCE: f64 = 0.2;

/// 渲染章节标题
///
/// 大纲与正文共用同一个函数，保证两者的编号和标题一致：
/// - 标题为空或就是默认标题时 → "Chapter 3"
/// - 否则 → "Chapter 3: The Crossing"
pub fn chapter_heading(language: Language, index: u32, heading: &str) -> String {
    let default = format!("{} {}", language.chapter_word(), index);
    let heading = heading.trim();
    if heading.is_empty() || heading.eq_ignore_ascii_case(&default) {
        default
    } else {
        format!("{}: {}", default, heading)
    }
}

/// 章节计划条目
///
/// 不变量:
/// - index 从 1 开始
/// - target_word_count > 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterPlanEntry {
    index: u32,
    heading: String,
    summary: String,
    target_word_count: u32,
    /// 是否为大纲缺失时合成的条目
    synthesized: bool,
}

impl ChapterPlanEntry {
    pub fn new(
        index: u32,
        heading: impl Into<String>,
        summary: impl Into<String>,
        target_word_count: u32,
    ) -> Result<Self, StoryError> {
        if index == 0 {
            return Err(StoryError::InvalidPlan("章节编号必须从1开始".to_string()));
        }
        if target_word_count == 0 {
            return Err(StoryError::InvalidPlan(format!(
                "第{}章的目标字数不能为0",
                index
            )));
        }
        Ok(Self {
            index,
            heading: heading.into().trim().to_string(),
            summary: summary.into().trim().to_string(),
            target_word_count,
            synthesized: false,
        })
    }

    /// 根据故事梗概合成最小条目（大纲解析不完整时使用）
    pub fn synthesized(
        request: &GenerationRequest,
        index: u32,
        total: u32,
        target_word_count: u32,
    ) -> Self {
        let language = request.language();
        let summary = match language {
            Language::German => format!(
                "Teil {} von {}: Entwickle die Grundidee \"{}\" weiter{}.",
                index,
                total,
                request.premise(),
                if request.setting().is_empty() {
                    String::new()
                } else {
                    format!(" im Setting \"{}\"", request.setting())
                }
            ),
            Language::English => format!(
                "Part {} of {}: continue developing the premise \"{}\"{}.",
                index,
                total,
                request.premise(),
                if request.setting().is_empty() {
                    String::new()
                } else {
                    format!(" in the setting \"{}\"", request.setting())
                }
            ),
        };

        Self {
            index,
            heading: format!("{} {}", language.chapter_word(), index),
            summary,
            target_word_count: target_word_count.max(1),
            synthesized: true,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn target_word_count(&self) -> u32 {
        self.target_word_count
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    /// 完整标题（含章节编号）
    pub fn display_heading(&self, language: Language) -> String {
        chapter_heading(language, self.index, &self.heading)
    }
}

/// 从大纲文本中恢复出的章节（尚未附加目标字数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChapter {
    pub index: u32,
    pub heading: String,
    pub summary: String,
}

/// 章节计划
///
/// 不变量:
/// - 至少一个条目
/// - index 从 1 开始连续递增
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterPlan {
    entries: Vec<ChapterPlanEntry>,
}

impl ChapterPlan {
    pub fn new(entries: Vec<ChapterPlanEntry>) -> Result<Self, StoryError> {
        if entries.is_empty() {
            return Err(StoryError::InvalidPlan("章节计划不能为空".to_string()));
        }
        for (position, entry) in entries.iter().enumerate() {
            let expected = position as u32 + 1;
            if entry.index != expected {
                return Err(StoryError::InvalidPlan(format!(
                    "章节编号不连续: 期望 {}, 实际 {}",
                    expected, entry.index
                )));
            }
        }
        Ok(Self { entries })
    }

    /// 用解析结果补全计划
    ///
    /// `targets` 的长度即章节数。解析结果中缺失的编号用合成条目补齐，
    /// 超出范围或重复的编号被忽略（保留第一次出现的）。
    /// 返回计划以及被合成的章节编号。
    pub fn complete_from(
        parsed: &[ParsedChapter],
        request: &GenerationRequest,
        targets: &[u32],
    ) -> Result<(Self, Vec<u32>), StoryError> {
        let total = targets.len() as u32;
        let mut entries = Vec::with_capacity(targets.len());
        let mut synthesized = Vec::new();

        for (position, target) in targets.iter().enumerate() {
            let index = position as u32 + 1;
            match parsed.iter().find(|p| p.index == index) {
                Some(found) if !found.summary.trim().is_empty() => {
                    let heading = if found.heading.trim().is_empty() {
                        format!("{} {}", request.language().chapter_word(), index)
                    } else {
                        found.heading.clone()
                    };
                    entries.push(ChapterPlanEntry::new(
                        index,
                        heading,
                        found.summary.clone(),
                        *target,
                    )?);
                }
                _ => {
                    entries.push(ChapterPlanEntry::synthesized(request, index, total, *target));
                    synthesized.push(index);
                }
            }
        }

        Ok((Self::new(entries)?, synthesized))
    }

    pub fn entries(&self) -> &[ChapterPlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&ChapterPlanEntry> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
    }

    /// 所有条目目标字数之和
    pub fn total_target(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.target_word_count as u64)
            .sum()
    }

    /// 总目标字数是否在请求目标的 ±PLAN_TOLERANCE 范围内
    pub fn is_within_tolerance(&self, requested: u32) -> bool {
        let requested = requested as f64;
        let total = self.total_target() as f64;
        (total - requested).abs() <= requested * PLAN_TOLERANCE
    }

    pub fn synthesized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.synthesized).count()
    }

    /// 渲染大纲（Markdown），章节标题与正文一致
    pub fn render_outline(&self, title: &str, language: Language) -> String {
        let header = match language {
            Language::German => format!("# Plot-Outline für '{}'", title),
            Language::English => format!("# Plot Outline for '{}'", title),
        };
        let words_label = match language {
            Language::German => "Ziel-Wortanzahl",
            Language::English => "Target words",
        };

        let mut out = header;
        for entry in &self.entries {
            out.push_str("\n\n## ");
            out.push_str(&entry.display_heading(language));
            out.push_str("\n\n");
            out.push_str(&entry.summary);
            out.push_str(&format!("\n\n_{}: {}_", words_label, entry.target_word_count));
        }
        out
    }
}

/// 已接受的章节
///
/// 接受后不可修改；word_count 与 continuity_summary 都是派生值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedChapter {
    index: u32,
    heading: String,
    text: String,
    word_count: u32,
    continuity_summary: String,
}

impl GeneratedChapter {
    pub fn new(
        index: u32,
        heading: impl Into<String>,
        text: impl Into<String>,
        continuity_summary: impl Into<String>,
    ) -> Result<Self, StoryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(StoryError::ChapterMismatch(format!(
                "第{}章内容为空",
                index
            )));
        }
        let word_count = crate::domain::count_words(&text);
        Ok(Self {
            index,
            heading: heading.into(),
            text,
            word_count,
            continuity_summary: continuity_summary.into(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> u32 {
        self.word_count
    }

    pub fn continuity_summary(&self) -> &str {
        &self.continuity_summary
    }
}
