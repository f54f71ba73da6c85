//! 组装器
//!
//! 把章节计划和已接受的章节合并为最终文档。纯函数：不调用服务、没有副作用，
//! 相同输入得到逐字节相同的输出。

use super::story::{
    ChapterPlan, GeneratedChapter, GenerationRequest, StoryDocument, StoryError, StorySection,
};

/// 组装分章故事
///
/// 章节按 index 排序后必须与计划一一对应，否则返回 ChapterMismatch。
pub fn assemble(
    request: &GenerationRequest,
    plan: &ChapterPlan,
    chapters: &[GeneratedChapter],
) -> Result<StoryDocument, StoryError> {
    if chapters.len() != plan.len() {
        return Err(StoryError::ChapterMismatch(format!(
            "计划 {} 章, 实际 {} 章",
            plan.len(),
            chapters.len()
        )));
    }

    let mut ordered: Vec<&GeneratedChapter> = chapters.iter().collect();
    ordered.sort_by_key(|c| c.index());

    let language = request.language();
    let mut sections = Vec::with_capacity(ordered.len());
    for (entry, chapter) in plan.entries().iter().zip(ordered) {
        if entry.index() != chapter.index() {
            return Err(StoryError::ChapterMismatch(format!(
                "缺少第{}章",
                entry.index()
            )));
        }
        sections.push(StorySection {
            index: entry.index(),
            heading: Some(entry.display_heading(language)),
            body: chapter.text().trim().to_string(),
        });
    }

    Ok(StoryDocument::new(
        request.title(),
        language,
        Some(plan.clone()),
        sections,
    ))
}

/// 组装单次生成的故事（没有章节标题）
pub fn assemble_single_shot(
    request: &GenerationRequest,
    chapter: &GeneratedChapter,
) -> StoryDocument {
    StoryDocument::new(
        request.title(),
        request.language(),
        None,
        vec![StorySection {
            index: 1,
            heading: None,
            body: chapter.text().trim().to_string(),
        }],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::story::{ChapterPlanEntry, Language};

    fn request() -> GenerationRequest {
        GenerationRequest::new("T", "P", "S", 6000, Language::English).unwrap()
    }

    fn plan() -> ChapterPlan {
        ChapterPlan::new(vec![
            ChapterPlanEntry::new(1, "Arrival", "a", 3000).unwrap(),
            ChapterPlanEntry::new(2, "", "b", 3000).unwrap(),
        ])
        .unwrap()
    }

    fn chapters() -> Vec<GeneratedChapter> {
        vec![
            GeneratedChapter::new(2, "Chapter 2", "Second text.", "s2").unwrap(),
            GeneratedChapter::new(1, "Chapter 1: Arrival", "First text.", "s1").unwrap(),
        ]
    }

    #[test]
    fn test_assemble_orders_by_index() {
        let doc = assemble(&request(), &plan(), &chapters()).unwrap();
        assert_eq!(
            doc.render(),
            "# T\n\n## Chapter 1: Arrival\n\nFirst text.\n\n## Chapter 2\n\nSecond text.\n"
        );
        assert_eq!(doc.plan(), Some(&plan()));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let first = assemble(&request(), &plan(), &chapters()).unwrap().render();
        let second = assemble(&request(), &plan(), &chapters()).unwrap().render();
        assert_eq!(first, second);
    }

    #[test]
    fn test_outline_and_document_headings_match() {
        let doc = assemble(&request(), &plan(), &chapters()).unwrap();
        let outline = plan().render_outline("T", Language::English);
        for section in doc.sections() {
            let heading = section.heading.as_ref().unwrap();
            assert!(outline.contains(&format!("## {}", heading)));
        }
    }

    #[test]
    fn test_assemble_rejects_mismatch() {
        let mut chapters = chapters();
        chapters.pop();
        assert!(matches!(
            assemble(&request(), &plan(), &chapters),
            Err(StoryError::ChapterMismatch(_))
        ));

        let wrong = vec![
            GeneratedChapter::new(1, "", "a", "").unwrap(),
            GeneratedChapter::new(3, "", "c", "").unwrap(),
        ];
        assert!(assemble(&request(), &plan(), &wrong).is_err());
    }

    #[test]
    fn test_single_shot_has_no_chapter_headings() {
        let chapter = GeneratedChapter::new(1, "", "Whole story.", "").unwrap();
        let doc = assemble_single_shot(&request(), &chapter);
        assert_eq!(doc.render(), "# T\n\nWhole story.\n");
        assert!(doc.plan().is_none());
    }
}
