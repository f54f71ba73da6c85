//! Story Context - Aggregate Root

use serde::Serialize;

use super::{ChapterPlan, Language};
use crate::domain::count_words;

/// 文档中的一个章节段落
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorySection {
    pub index: u32,
    /// 单次生成的故事没有章节标题
    pub heading: Option<String>,
    pub body: String,
}

/// StoryDocument 聚合根
///
/// 不变量:
/// - 只在所有章节都被接受后组装，不存在部分文档
/// - sections 按 index 升序
/// - 渲染结果只取决于内容（不含时间戳等），相同输入得到相同输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryDocument {
    title: String,
    language: Language,
    plan: Option<ChapterPlan>,
    sections: Vec<StorySection>,
    epilogue: Option<String>,
}

impl StoryDocument {
    pub(crate) fn new(
        title: impl Into<String>,
        language: Language,
        plan: Option<ChapterPlan>,
        sections: Vec<StorySection>,
    ) -> Self {
        Self {
            title: title.into(),
            language,
            plan,
            sections,
            epilogue: None,
        }
    }

    /// 附加尾声（渲染在最后一章之后，不算作章节）
    pub fn with_epilogue(mut self, epilogue: impl Into<String>) -> Self {
        let epilogue = epilogue.into();
        let trimmed = epilogue.trim();
        self.epilogue = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn plan(&self) -> Option<&ChapterPlan> {
        self.plan.as_ref()
    }

    pub fn sections(&self) -> &[StorySection] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn epilogue(&self) -> Option<&str> {
        self.epilogue.as_deref()
    }

    /// 正文总词数（含尾声，不含标题）
    pub fn word_count(&self) -> u32 {
        let body: u32 = self.sections.iter().map(|s| count_words(&s.body)).sum();
        body + self.epilogue.as_deref().map(count_words).unwrap_or(0)
    }

    /// 渲染为 Markdown
    pub fn render(&self) -> String {
        let mut out = format!("# {}", self.title);
        for section in &self.sections {
            if let Some(heading) = &section.heading {
                out.push_str("\n\n## ");
                out.push_str(heading);
            }
            out.push_str("\n\n");
            out.push_str(section.body.trim());
        }
        if let Some(epilogue) = &self.epilogue {
            out.push_str("\n\n## ");
            out.push_str(self.language.epilogue_word());
            out.push_str("\n\n");
            out.push_str(epilogue);
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections() -> Vec<StorySection> {
        vec![
            StorySection {
                index: 1,
                heading: Some("Chapter 1: Dawn".to_string()),
                body: "The sun rose.".to_string(),
            },
            StorySection {
                index: 2,
                heading: Some("Chapter 2".to_string()),
                body: "  The sun set.  ".to_string(),
            },
        ]
    }

    #[test]
    fn test_render_chaptered() {
        let doc = StoryDocument::new("T", Language::English, None, sections());
        assert_eq!(
            doc.render(),
            "# T\n\n## Chapter 1: Dawn\n\nThe sun rose.\n\n## Chapter 2\n\nThe sun set.\n"
        );
        assert_eq!(doc.word_count(), 6);
        assert_eq!(doc.section_count(), 2);
    }

    #[test]
    fn test_render_with_epilogue() {
        let doc = StoryDocument::new("T", Language::German, None, sections())
            .with_epilogue(" Ende gut. ");
        let rendered = doc.render();
        assert!(rendered.ends_with("## Epilog\n\nEnde gut.\n"));
        assert_eq!(doc.word_count(), 8);

        let doc = doc.with_epilogue("   ");
        assert_eq!(doc.epilogue(), None);
    }

    #[test]
    fn test_render_single_section_without_heading() {
        let doc = StoryDocument::new(
            "T",
            Language::English,
            None,
            vec![StorySection {
                index: 1,
                heading: None,
                body: "Once upon a time.".to_string(),
            }],
        );
        assert_eq!(doc.render(), "# T\n\nOnce upon a time.\n");
    }
}
