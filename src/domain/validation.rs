//! 章节内容校验
//!
//! 三项检查：非空、词数在目标的容差范围内、开头没有拒绝/道歉类的失败标记。
//!
//! 失败标记只在正文开头匹配，并且必须是完整的词。以引号开头的文本是对白，不做匹配。

use serde::Serialize;
use thiserror::Error;

use super::text_cleaner::count_words;

pub const DEFAULT_MIN_RATIO: f64 = 0.5;
pub const DEFAULT_MAX_RATIO: f64 = 1.5;

/// 匹配失败标记前截取的开头字符数
pub const DEFAULT_MARKER_WINDOW_CHARS: usize = 300;

/// 默认失败标记（小写，锚定在正文开头）
pub const DEFAULT_FAILURE_MARKERS: &[&str] = &[
    "i'm sorry",
    "i apologize",
    "i am sorry",
    "i cannot",
    "i can't",
    "i can not",
    "as an ai",
    "as a language model",
    "i'm unable to",
    "i am unable to",
    "es tut mir leid",
    "ich kann nicht",
    "ich kann leider",
    "als ki",
    "als künstliche intelligenz",
    "als sprachmodell",
];

/// 校验失败原因
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("生成内容为空")]
    Empty,

    #[error("内容过短: {words} 词 (最少 {min})")]
    TooShort { words: u32, min: u32 },

    #[error("内容过长: {words} 词 (最多 {max})")]
    TooLong { words: u32, max: u32 },

    #[error("包含失败标记: {marker}")]
    FailureMarker { marker: String },
}

/// 校验策略
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPolicy {
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub markers: Vec<String>,
    pub marker_window_chars: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_ratio: DEFAULT_MIN_RATIO,
            max_ratio: DEFAULT_MAX_RATIO,
            markers: DEFAULT_FAILURE_MARKERS.iter().map(|m| m.to_string()).collect(),
            marker_window_chars: DEFAULT_MARKER_WINDOW_CHARS,
        }
    }
}

impl ValidationPolicy {
    pub fn with_ratios(min_ratio: f64, max_ratio: f64) -> Self {
        Self {
            min_ratio,
            max_ratio,
            ..Self::default()
        }
    }

    /// 目标对应的 (最少, 最多) 词数
    pub fn bounds(&self, target: u32) -> (u32, u32) {
        let min = (target as f64 * self.min_ratio).floor() as u32;
        let max = (target as f64 * self.max_ratio).ceil() as u32;
        (min, max.max(min))
    }

    /// 校验文本，通过时返回词数
    pub fn validate(&self, text: &str, target: u32) -> Result<u32, ValidationFailure> {
        if text.trim().is_empty() {
            return Err(ValidationFailure::Empty);
        }

        if let Some(marker) = self.leading_marker(text) {
            return Err(ValidationFailure::FailureMarker {
                marker: marker.to_string(),
            });
        }

        let words = count_words(text);
        let (min, max) = self.bounds(target);
        if words < min {
            return Err(ValidationFailure::TooShort { words, min });
        }
        if words > max {
            return Err(ValidationFailure::TooLong { words, max });
        }

        Ok(words)
    }

    /// 正文开头的失败标记
    fn leading_marker(&self, text: &str) -> Option<&str> {
        let head: String = text
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '#' | '>'))
            .chars()
            .take(self.marker_window_chars)
            .collect::<String>()
            .to_lowercase()
            .replace('\u{2019}', "'");

        self.markers
            .iter()
            .map(String::as_str)
            .find(|marker| starts_with_word(&head, marker))
    }
}

/// `head` 以完整的 `phrase` 开头（后面不紧跟字母或数字）
fn starts_with_word(head: &str, phrase: &str) -> bool {
    match head.strip_prefix(phrase) {
        Some(rest) => !rest.chars().next().is_some_and(char::is_alphanumeric),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_accepts_within_band() {
        let policy = ValidationPolicy::default();
        assert_eq!(policy.validate(&words(1500), 3000), Ok(1500));
        assert_eq!(policy.validate(&words(4500), 3000), Ok(4500));
        assert_eq!(policy.validate(&words(3000), 3000), Ok(3000));
    }

    #[test]
    fn test_rejects_ten_percent_of_target() {
        let policy = ValidationPolicy::default();
        assert_eq!(
            policy.validate(&words(300), 3000),
            Err(ValidationFailure::TooShort { words: 300, min: 1500 })
        );
    }

    #[test]
    fn test_rejects_runaway_length() {
        let policy = ValidationPolicy::default();
        assert_eq!(
            policy.validate(&words(4501), 3000),
            Err(ValidationFailure::TooLong { words: 4501, max: 4500 })
        );
    }

    #[test]
    fn test_rejects_empty() {
        let policy = ValidationPolicy::default();
        assert_eq!(policy.validate("  \n ", 100), Err(ValidationFailure::Empty));
    }

    #[test]
    fn test_detects_refusal_at_start_only() {
        let policy = ValidationPolicy::default();
        let refusal = format!("I’m sorry, but I can't write that. {}", words(3000));
        assert!(matches!(
            policy.validate(&refusal, 3000),
            Err(ValidationFailure::FailureMarker { .. })
        ));

        let german = format!("Es tut mir leid, {}", words(100));
        assert!(matches!(
            policy.validate(&german, 100),
            Err(ValidationFailure::FailureMarker { .. })
        ));

        // 正文中的对白不算
        let dialogue = format!("{} \"I'm sorry,\" she said.", words(3000));
        assert!(policy.validate(&dialogue, 3000).is_ok());
    }

    #[test]
    fn test_refusal_after_markdown_emphasis() {
        let policy = ValidationPolicy::default();
        let refusal = format!("**As an AI**, I can't continue this story. {}", words(3000));
        assert_eq!(
            policy.validate(&refusal, 3000),
            Err(ValidationFailure::FailureMarker {
                marker: "as an ai".to_string()
            })
        );
    }

    #[test]
    fn test_german_opening_is_not_refusal() {
        let policy = ValidationPolicy::default();
        for opening in [
            "Als Kind hatte Mara Angst vor dem Meer.",
            "Als Kinder spielten sie am Hafen.",
            "Als Kirchenglocken läuteten, erwachte das Dorf.",
        ] {
            let text = format!("{} {}", opening, words(3000));
            assert_eq!(policy.validate(&text, 3000), Ok(count_words(&text)), "{}", opening);
        }

        let refusal = format!("Als KI kann ich diese Geschichte nicht schreiben. {}", words(3000));
        assert!(matches!(
            policy.validate(&refusal, 3000),
            Err(ValidationFailure::FailureMarker { .. })
        ));
    }

    #[test]
    fn test_dialogue_opening_is_not_refusal() {
        let policy = ValidationPolicy::default();
        for opening in [
            "\"I cannot go back,\" Mara whispered.",
            "\u{201C}I can't breathe,\u{201D} he gasped.",
            "„Ich kann nicht mehr“, sagte sie.",
            "Mara said: I cannot go back.",
        ] {
            let text = format!("{} {}", opening, words(3000));
            assert!(policy.validate(&text, 3000).is_ok(), "{}", opening);
        }
    }

    #[test]
    fn test_custom_ratios() {
        let policy = ValidationPolicy::with_ratios(0.8, 1.2);
        assert_eq!(policy.bounds(1000), (800, 1200));
        assert!(policy.validate(&words(700), 1000).is_err());
    }
}
