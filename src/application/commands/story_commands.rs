//! Story Commands

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::story::{GenerationRequest, Language, StoryError};

/// 生成故事命令
///
/// 可直接从 JSON 反序列化；`setting`、`language` 可省略。
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateStory {
    pub title: String,
    pub premise: String,
    #[serde(default)]
    pub setting: String,
    pub target_word_count: u32,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub extra_instructions: Option<String>,
    /// 调用方指定的运行 ID（用于订阅进度事件），缺省时自动生成
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

impl GenerateStory {
    pub fn new(
        title: impl Into<String>,
        premise: impl Into<String>,
        setting: impl Into<String>,
        target_word_count: u32,
        language: Language,
    ) -> Self {
        Self {
            title: title.into(),
            premise: premise.into(),
            setting: setting.into(),
            target_word_count,
            language,
            extra_instructions: None,
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_extra_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.extra_instructions = Some(instructions.into());
        self
    }

    /// 校验并转换为领域请求
    pub fn to_request(&self) -> Result<GenerationRequest, StoryError> {
        let request = GenerationRequest::new(
            self.title.as_str(),
            self.premise.as_str(),
            self.setting.as_str(),
            self.target_word_count,
            self.language,
        )?;
        Ok(match &self.extra_instructions {
            Some(extra) => request.with_extra_instructions(extra.as_str()),
            None => request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let command: GenerateStory = serde_json::from_str(
            r#"{"title": "Die Flut", "premise": "Ein Dorf", "target_word_count": 9000}"#,
        )
        .unwrap();
        assert_eq!(command.language, Language::German);
        assert!(command.setting.is_empty());
        assert!(command.run_id.is_none());
        assert!(command.to_request().is_ok());
    }

    #[test]
    fn test_language_aliases() {
        let command: GenerateStory = serde_json::from_str(
            r#"{"title": "T", "premise": "P", "target_word_count": 1000, "language": "en"}"#,
        )
        .unwrap();
        assert_eq!(command.language, Language::English);
    }

    #[test]
    fn test_invalid_request() {
        let command = GenerateStory::new("  ", "P", "S", 1000, Language::English);
        assert!(matches!(command.to_request(), Err(StoryError::InvalidTitle(_))));
    }

    #[test]
    fn test_json_request_goes_through_validation() {
        let command: GenerateStory = serde_json::from_str(
            r#"{"title": "", "premise": "P", "target_word_count": 0}"#,
        )
        .unwrap();
        assert!(command.to_request().is_err());
    }
}
