//! 文本清理
//!
//! 模型输出的规范化工具：统计词数、去掉模型自带的标题、
//! 修正被截断的结尾、截取片段。所有函数都按字符边界处理，可安全用于多字节文本。

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::story::Language;

/// 小于此字符数的文本不做结尾修正
pub const MIN_CHARS_FOR_CLEANUP: usize = 100;

/// 末段少于此词数视为不完整
pub const MIN_WORDS_FOR_VALID_ENDING: usize = 4;

/// 没有标点时，末行短于此字符数才会被丢弃
const MAX_DANGLING_LINE_CHARS: usize = 50;

/// 结尾片段对齐到段落开头时，断点至少要落在窗口的这个比例之后
const PARAGRAPH_ALIGN_RATIO: f64 = 0.3;

/// 句末标点
#[inline]
fn is_strong_delimiter(ch: char) -> bool {
    matches!(ch, '.' | '?' | '!' | '。' | '？' | '！' | '…')
}

/// 句末标点之后可以跟随的收尾字符
#[inline]
fn is_closing_char(ch: char) -> bool {
    matches!(
        ch,
        '"' | '\'' | '\u{201C}' | '\u{201D}' | '\u{2019}' | '\u{00AB}' | '\u{00BB}' | ')' | '*'
    )
}

/// 统计词数（按空白分割）
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

fn heading_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[\s#*_]*(chapter|kapitel|epilog|epilogue)\b")
            .expect("valid heading regex")
    })
}

/// 去掉文本开头的标题行
///
/// 模型经常自行输出 "# Titel" 或 "Chapter 3: ..."，章节标题由组装器统一生成。
pub fn strip_leading_headings(text: &str) -> String {
    let mut lines = text.trim_start().lines().peekable();
    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || heading_line_regex().is_match(trimmed)
        {
            lines.next();
        } else {
            break;
        }
    }
    lines.collect::<Vec<_>>().join("\n").trim().to_string()
}

/// 文本是否以完整句子结束
fn ends_cleanly(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|c| is_strong_delimiter(c) || is_closing_char(c))
        .unwrap_or(false)
}

/// 从 `pos`（句末标点的字节位置）向后吞掉标点本身和随后的收尾字符
fn extend_past_closing(text: &str, pos: usize) -> usize {
    let mut end = pos;
    for (offset, ch) in text[pos..].char_indices() {
        if offset == 0 || is_closing_char(ch) {
            end = pos + offset + ch.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// 最后一个句末标点的字节位置
fn last_strong_delimiter(text: &str) -> Option<usize> {
    text.char_indices()
        .rev()
        .find(|(_, c)| is_strong_delimiter(*c))
        .map(|(i, _)| i)
}

/// 段落中最后一个未闭合引号的字节位置
///
/// 用栈匹配引号对，同时支持 "..."、“...”、„...“ 和 »...«。
fn unclosed_quote_start(paragraph: &str) -> Option<usize> {
    let mut stack: Vec<(usize, char)> = Vec::new();
    for (i, ch) in paragraph.char_indices() {
        let expected_close = stack.last().map(|(_, close)| *close);
        if expected_close == Some(ch) {
            stack.pop();
            continue;
        }
        let close = match ch {
            '"' => '"',
            '\u{201C}' => '\u{201D}',
            '\u{201E}' => '\u{201C}',
            '\u{00BB}' => '\u{00AB}',
            _ => continue,
        };
        stack.push((i, close));
    }
    stack.last().map(|(i, _)| *i)
}

/// 修正被截断的结尾
///
/// 依次检查：
/// 1. 末尾没有句末标点 → 截到最后一个完整句子（找不到时丢弃很短的末行）
/// 2. 末段有未闭合的引号且引号在最后一个句子之后开始 → 截到引号之前
/// 3. 末段过短或以连词结尾，且前一段结束完整 → 丢弃末段
pub fn clean_text_ending(text: &str, language: Language) -> String {
    let mut text = text.trim_end().to_string();
    if text.trim().chars().count() < MIN_CHARS_FOR_CLEANUP {
        return text;
    }

    // 1. 末尾缺少标点
    let last_is_alnum = text.chars().last().map(char::is_alphanumeric).unwrap_or(false);
    if !ends_cleanly(&text) && last_is_alnum {
        match last_strong_delimiter(&text) {
            Some(pos) => {
                let end = extend_past_closing(&text, pos);
                text.truncate(end);
            }
            None => {
                if let Some(newline) = text.rfind('\n') {
                    if text[newline..].chars().count() < MAX_DANGLING_LINE_CHARS {
                        text.truncate(newline);
                    }
                }
            }
        }
        text = text.trim_end().to_string();
    }

    // 2. 末段悬空的引号
    let para_start = text.rfind("\n\n").map(|i| i + 2).unwrap_or(0);
    let last_paragraph = text[para_start..].to_string();
    if let Some(quote) = unclosed_quote_start(&last_paragraph) {
        let sentence_end = last_strong_delimiter(&last_paragraph[..quote]);
        match sentence_end {
            Some(pos) => {
                let end = extend_past_closing(&last_paragraph[..quote], pos);
                text.truncate(para_start + end);
            }
            None => text.truncate(para_start),
        }
        text = text.trim_end().to_string();
    }

    // 3. 末段过短或以连词结尾
    if let Some(split) = text.rfind("\n\n") {
        let (before, last) = text.split_at(split);
        let words: Vec<&str> = last.split_whitespace().collect();
        let ends_with_conjunction = words
            .last()
            .map(|w| {
                let cleaned = w
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase();
                language.trailing_conjunctions().contains(&cleaned.as_str())
            })
            .unwrap_or(false);
        let previous_ok = ends_cleanly(before);

        if ((words.len() < MIN_WORDS_FOR_VALID_ENDING || ends_with_conjunction) && previous_ok)
            || (words.len() < 2 && !previous_ok)
        {
            text = before.trim_end().to_string();
        }
    }

    text
}

/// 保留文本最后 max_chars 个字符
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

/// 保留文本前 max_chars 个字符，截断时追加省略号
pub fn truncate_head(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// 截取结尾片段，尽量从段落开头开始
///
/// 窗口内如果有段落分隔并且位于窗口 30% 之后，则从该段落开始，
/// 避免片段以半句话开头。
pub fn tail_excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let window = truncate_tail(text, max_chars);
    if window.len() == text.len() {
        return window;
    }

    let threshold = (window.len() as f64 * PARAGRAPH_ALIGN_RATIO) as usize;
    match window.find("\n\n") {
        Some(pos) if pos > threshold => window[pos..].trim().to_string(),
        _ => window.trim().to_string(),
    }
}

/// 取前 n 个句子
pub fn first_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if !is_strong_delimiter(ch) {
            continue;
        }
        // 连续的标点（"?!" / "..."）算作一个句末
        if chars.peek().map(|(_, c)| is_strong_delimiter(*c)).unwrap_or(false) {
            continue;
        }
        count += 1;
        if count == n {
            let end = extend_past_closing(text, i);
            return text[..end].trim().to_string();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(body: &str) -> String {
        format!("{}\n\n{}", "The harbour was quiet that morning. ".repeat(4).trim(), body)
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  one\ttwo\n\nthree  "), 3);
    }

    #[test]
    fn test_strip_leading_headings() {
        let text = "# Die Reise\n\n## Kapitel 2: Der Sturm\n**Chapter 2**\n\nEs regnete.\n\n# Not stripped";
        assert_eq!(strip_leading_headings(text), "Es regnete.\n\n# Not stripped");
        assert_eq!(strip_leading_headings("Chapters of life began."), "Chapters of life began.");
    }

    #[test]
    fn test_trailing_fragment_is_cut() {
        let text = padded("She opened the door. Outside, the wind was");
        let cleaned = clean_text_ending(&text, Language::English);
        assert!(cleaned.ends_with("She opened the door."));
    }

    #[test]
    fn test_unclosed_quote_is_cut() {
        let text = padded("He turned around slowly to face her. \"Wait, I need to tell you.");
        let cleaned = clean_text_ending(&text, Language::English);
        assert!(cleaned.ends_with("to face her."), "{}", cleaned);
    }

    #[test]
    fn test_german_quotes_are_matched() {
        let text = padded("Er lachte. „Das ist gut“, sagte sie.");
        assert_eq!(clean_text_ending(&text, Language::German), text);
    }

    #[test]
    fn test_short_last_paragraph_is_dropped() {
        let text = padded("The end.");
        let cleaned = clean_text_ending(&text, Language::English);
        assert!(cleaned.ends_with("that morning."));
    }

    #[test]
    fn test_fragment_without_delimiter_in_paragraph() {
        let text = padded("Sie ging langsam nach Hause und dachte nach");
        let cleaned = clean_text_ending(&text, Language::German);
        assert!(cleaned.ends_with("that morning."), "{}", cleaned);
    }

    #[test]
    fn test_conjunction_ending_is_dropped() {
        let text = padded("Sie ging langsam nach Hause und…");
        let cleaned = clean_text_ending(&text, Language::German);
        assert!(cleaned.ends_with("that morning."), "{}", cleaned);
    }

    #[test]
    fn test_clean_text_untouched() {
        let text = padded("They walked home together, talking about the storm.");
        assert_eq!(clean_text_ending(&text, Language::English), text);
        assert_eq!(clean_text_ending("Too short and", Language::English), "Too short and");
    }

    #[test]
    fn test_truncate_tail_and_head_are_char_safe() {
        assert_eq!(truncate_tail("äöüß", 2), "üß");
        assert_eq!(truncate_tail("abc", 10), "abc");
        assert_eq!(truncate_head("äöüß", 2), "äö…");
        assert_eq!(truncate_head("abc", 3), "abc");
    }

    #[test]
    fn test_tail_excerpt_aligns_to_paragraph() {
        let text = format!("{}\n\nLast paragraph here.", "x".repeat(200));
        let excerpt = tail_excerpt(&text, 40);
        assert_eq!(excerpt, "Last paragraph here.");

        let short = "Only one paragraph.";
        assert_eq!(tail_excerpt(short, 100), short);
    }

    #[test]
    fn test_first_sentences() {
        let text = "One. Two?! \"Three.\" Four.";
        assert_eq!(first_sentences(text, 1), "One.");
        assert_eq!(first_sentences(text, 3), "One. Two?! \"Three.\"");
        assert_eq!(first_sentences("No delimiter", 2), "No delimiter");
    }
}
