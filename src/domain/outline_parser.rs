//! 大纲解析器
//!
//! 模型返回的大纲是非结构化文本，这里按模式宽松地识别章节段落。
//! 解析从不失败：返回部分结果和完整度，缺失的章节由调用方补齐。

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::story::ParsedChapter;

/// "Chapter 3: Title" / "## Kapitel 3 - Title" / "**Chapter 3**"
fn chapter_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[\s#*_]*(?:chapter|kapitel)\s+(\d+)\b[\s*_]*[:.\-\u{2013}\u{2014})]?\s*(.*)$")
            .expect("valid chapter heading regex")
    })
}

/// "3. Title" / "3: Title"，只在没有任何章节标题时使用
fn numbered_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\s#*_]*(\d+)[.:)]\s*(.*)$").expect("valid numbered heading regex")
    })
}

/// 结束当前章节段落的收尾标记
fn end_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[\s#*_]*(?:epilog|epilogue|fazit|gesamtfazit|conclusion|final thoughts)\b",
        )
        .expect("valid end marker regex")
    })
}

/// 大纲解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineParse {
    /// 按 index 升序，只含 1..=expected 范围内的编号，每个编号最多一次
    pub entries: Vec<ParsedChapter>,
    pub expected: u32,
}

impl OutlineParse {
    /// 恢复出的章节数 / 期望章节数
    pub fn completeness(&self) -> f64 {
        if self.expected == 0 {
            return 1.0;
        }
        self.entries.len() as f64 / self.expected as f64
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() as u32 == self.expected
    }

    /// 缺失的章节编号
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.expected)
            .filter(|i| !self.entries.iter().any(|e| e.index == *i))
            .collect()
    }
}

/// 清理标题两侧的 Markdown 强调符号和引号
fn clean_heading(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '#' | '"' | '\u{201E}' | '\u{201C}' | '\u{201D}'))
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_string()
}

struct Section {
    index: u32,
    heading: String,
    body: Vec<String>,
}

/// 解析大纲文本
///
/// - 以 "Chapter N" / "Kapitel N" 行作为章节开头（大小写不敏感，允许 # 与 ** 前缀）
/// - 没有任何此类标题时，退回到 "N." / "N:" 编号行
/// - 章节段落在下一个标题或 Epilog / Conclusion / Fazit 等标记处结束
/// - 超出 1..=expected 的编号被忽略，重复编号保留第一次出现的
pub fn parse_outline(text: &str, expected: u32) -> OutlineParse {
    let has_chapter_headings = text
        .lines()
        .any(|line| chapter_heading_regex().is_match(line));
    let heading_regex = if has_chapter_headings {
        chapter_heading_regex()
    } else {
        numbered_heading_regex()
    };

    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(caps) = heading_regex.captures(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            let index = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            let heading = caps.get(2).map(|m| clean_heading(m.as_str())).unwrap_or_default();
            current = Some(Section {
                index,
                heading,
                body: Vec::new(),
            });
            continue;
        }

        if end_marker_regex().is_match(line) {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            continue;
        }

        if let Some(section) = current.as_mut() {
            section.body.push(line.to_string());
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }

    let mut entries: Vec<ParsedChapter> = Vec::new();
    for section in sections {
        if section.index == 0 || section.index > expected {
            continue;
        }
        if entries.iter().any(|e| e.index == section.index) {
            continue;
        }

        let mut summary = section.body.join("\n").trim().to_string();
        if summary.is_empty() {
            // 标题和梗概写在同一行
            summary = section.heading.clone();
        }
        if summary.is_empty() {
            continue;
        }

        entries.push(ParsedChapter {
            index: section.index,
            heading: section.heading,
            summary,
        });
    }
    entries.sort_by_key(|e| e.index);

    OutlineParse { entries, expected }
}
