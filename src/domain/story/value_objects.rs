//! Story Context - Value Objects

use serde::{Deserialize, Serialize};

use super::StoryError;
use crate::domain::text_cleaner::{truncate_head, truncate_tail};

/// 生成语言
///
/// German 为主语言（默认），English 为次语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    #[serde(alias = "de", alias = "deutsch", alias = "Deutsch", alias = "primary")]
    German,
    #[serde(
        alias = "en",
        alias = "englisch",
        alias = "Englisch",
        alias = "English",
        alias = "secondary"
    )]
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::German => "german",
            Language::English => "english",
        }
    }

    /// 宽松解析（de / deutsch / german / en / englisch / english）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "de" | "deutsch" | "german" | "primary" => Some(Language::German),
            "en" | "englisch" | "english" | "secondary" => Some(Language::English),
            _ => None,
        }
    }

    /// 语言的自称（写入提示词）
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::German => "Deutsch",
            Language::English => "English",
        }
    }

    /// 章节标题前缀
    pub fn chapter_word(&self) -> &'static str {
        match self {
            Language::German => "Kapitel",
            Language::English => "Chapter",
        }
    }

    pub fn epilogue_word(&self) -> &'static str {
        match self {
            Language::German => "Epilog",
            Language::English => "Epilogue",
        }
    }

    /// 句尾不应出现的连词（用于识别被截断的结尾）
    pub fn trailing_conjunctions(&self) -> &'static [&'static str] {
        match self {
            Language::German => &["und", "aber", "oder", "denn", "weil", "dass", "ob"],
            Language::English => &["and", "but", "or", "because", "that", "if", "so"],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 标题最大长度（字符）
const MAX_TITLE_CHARS: usize = 200;

/// 故事生成请求
///
/// 不变量:
/// - title / premise 非空
/// - target_word_count > 0
/// - 创建后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    title: String,
    premise: String,
    setting: String,
    target_word_count: u32,
    language: Language,
    extra_instructions: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        title: impl Into<String>,
        premise: impl Into<String>,
        setting: impl Into<String>,
        target_word_count: u32,
        language: Language,
    ) -> Result<Self, StoryError> {
        let title = title.into().trim().to_string();
        let premise = premise.into().trim().to_string();

        if title.is_empty() {
            return Err(StoryError::InvalidTitle("标题不能为空".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(StoryError::InvalidTitle(format!(
                "标题长度不能超过{}字符",
                MAX_TITLE_CHARS
            )));
        }
        if premise.is_empty() {
            return Err(StoryError::InvalidPremise("故事梗概不能为空".to_string()));
        }
        if target_word_count == 0 {
            return Err(StoryError::InvalidWordCount(target_word_count));
        }

        Ok(Self {
            title,
            premise,
            setting: setting.into().trim().to_string(),
            target_word_count,
            language,
            extra_instructions: None,
        })
    }

    /// 附加额外写作指令（空白字符串视为无）
    pub fn with_extra_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        let trimmed = instructions.trim();
        self.extra_instructions = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn premise(&self) -> &str {
        &self.premise
    }

    pub fn setting(&self) -> &str {
        &self.setting
    }

    pub fn target_word_count(&self) -> u32 {
        self.target_word_count
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn extra_instructions(&self) -> Option<&str> {
        self.extra_instructions.as_deref()
    }
}

/// 连续性上下文
///
/// 从第 n 章带到第 n+1 章的叙事状态，由两部分组成：
/// - running_summary: 到目前为止整篇故事的滚动摘要
/// - recent_ending: 上一章结尾的原文片段（用于无缝衔接）
///
/// 两部分都有长度上限，与章节长度无关。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContinuityContext {
    running_summary: String,
    recent_ending: String,
    /// 最后一个被纳入摘要的章节编号（0 表示故事尚未开始）
    through_chapter: u32,
}

impl ContinuityContext {
    /// 第一章之前的空上下文
    pub fn empty() -> Self {
        Self::default()
    }

    /// 创建并按上限截断
    ///
    /// 摘要保留尾部（最新的叙事状态），结尾片段同样保留尾部。
    pub fn bounded(
        running_summary: &str,
        recent_ending: &str,
        through_chapter: u32,
        max_summary_chars: usize,
        max_ending_chars: usize,
    ) -> Self {
        Self {
            running_summary: truncate_tail(running_summary.trim(), max_summary_chars),
            recent_ending: truncate_tail(recent_ending.trim(), max_ending_chars),
            through_chapter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.running_summary.is_empty() && self.recent_ending.is_empty()
    }

    pub fn running_summary(&self) -> &str {
        &self.running_summary
    }

    pub fn recent_ending(&self) -> &str {
        &self.recent_ending
    }

    pub fn through_chapter(&self) -> u32 {
        self.through_chapter
    }

    /// 总字符数
    pub fn char_len(&self) -> usize {
        self.running_summary.chars().count() + self.recent_ending.chars().count()
    }

    /// 简短描述（日志用）
    pub fn preview(&self, max_chars: usize) -> String {
        truncate_head(&self.running_summary, max_chars)
    }
}
